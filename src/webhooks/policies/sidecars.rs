//! DaemonSet sidecar injection policy.
//!
//! Mutating: every DaemonSet in the cluster that does not carry an ignored
//! label key contributes its pod-template containers to the admitted pod.
//! Each contributing DaemonSet emits one `replace` of `/spec/containers`
//! holding the running total, so later replaces extend earlier ones instead of
//! clobbering them. A single `add` of the `origin` annotation always follows.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Container, Pod};
use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use json_patch::PatchOperation;
use serde_json::json;
use tracing::{debug, info, warn};

use super::Decision;
use crate::cluster::DaemonSetLister;
use crate::config::MutatorConfig;
use crate::error::Result;
use crate::health::HealthState;
use crate::webhooks::patch::{ANNOTATIONS_PATH, CONTAINERS_PATH, add_op, pointer, replace_op};
use crate::webhooks::pod::{parse_pod, pod_containers};

/// Annotation key marking a pod as mutated
pub const ORIGIN_ANNOTATION_KEY: &str = "origin";
/// Annotation value marking a pod as mutated
pub const ORIGIN_ANNOTATION_VALUE: &str = "fromMutation";

/// Whether any of the DaemonSet's label keys is in the ignore-list
pub fn is_ignored(daemon_set: &DaemonSet, config: &MutatorConfig) -> bool {
    daemon_set
        .labels()
        .keys()
        .any(|key| config.ignore_label_keys.contains(key))
}

/// Containers of the DaemonSet's pod template
pub fn template_containers(daemon_set: &DaemonSet) -> &[Container] {
    daemon_set
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default()
}

/// Patch computed for one pod
#[derive(Debug, Clone, PartialEq)]
pub struct SidecarPlan {
    /// Final container list after all injections
    pub containers: Vec<Container>,
    /// Ordered patch: replaces first, annotation add last
    pub patch: Vec<PatchOperation>,
    /// Number of containers added to the pod
    pub injected: usize,
    /// Number of DaemonSets skipped by the ignore-list
    pub ignored: usize,
}

/// Compute the sidecar patch for `pod` against a DaemonSet snapshot
pub fn plan(pod: &Pod, daemon_sets: &[DaemonSet], config: &MutatorConfig) -> Result<SidecarPlan> {
    let mut containers = pod_containers(pod).to_vec();
    let mut patch = Vec::new();
    let mut ignored = 0;
    let original = containers.len();

    if pod.spec.is_none() {
        warn!(pod = %pod.name_any(), "Pod has no spec, skipping sidecar injection");
    } else {
        for daemon_set in daemon_sets {
            if is_ignored(daemon_set, config) {
                debug!(
                    namespace = daemon_set.metadata.namespace.as_deref().unwrap_or_default(),
                    name = %daemon_set.name_any(),
                    "Skipping ignored DaemonSet"
                );
                ignored += 1;
                continue;
            }

            let sidecars = template_containers(daemon_set);
            if sidecars.is_empty() {
                continue;
            }

            containers.extend_from_slice(sidecars);
            patch.push(replace_op(
                pointer(CONTAINERS_PATH),
                serde_json::to_value(&containers)?,
            ));
        }
    }

    patch.push(origin_annotation_op(pod));

    Ok(SidecarPlan {
        injected: containers.len() - original,
        containers,
        patch,
        ignored,
    })
}

/// `add` of the origin annotation that keeps existing annotations intact
fn origin_annotation_op(pod: &Pod) -> PatchOperation {
    if pod.metadata.annotations.is_some() {
        let mut path = ANNOTATIONS_PATH.to_vec();
        path.push(ORIGIN_ANNOTATION_KEY);
        add_op(pointer(path), json!(ORIGIN_ANNOTATION_VALUE))
    } else {
        add_op(
            pointer(ANNOTATIONS_PATH),
            json!({ ORIGIN_ANNOTATION_KEY: ORIGIN_ANNOTATION_VALUE }),
        )
    }
}

/// Mutating callback for pod creation
pub struct SidecarMutator<L> {
    lister: L,
    config: MutatorConfig,
    health_state: Option<Arc<HealthState>>,
}

impl<L: DaemonSetLister> SidecarMutator<L> {
    pub fn new(lister: L, config: MutatorConfig, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            lister,
            config,
            health_state,
        }
    }

    pub fn config(&self) -> &MutatorConfig {
        &self.config
    }

    /// Compute the patch for the pod in `request`.
    ///
    /// A payload that does not parse as a pod is denied with the parse error.
    /// Failing to list DaemonSets is returned as `Err`; the request is never
    /// admitted against a missing snapshot.
    pub async fn admit(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Decision> {
        let pod = match parse_pod(request.object.as_ref()) {
            Ok(pod) => pod,
            Err(e) => return Ok(Decision::deny(e.to_string())),
        };

        let daemon_sets = self.lister.list_daemon_sets(None).await?;
        info!(count = daemon_sets.len(), "DaemonSets found");
        for daemon_set in &daemon_sets {
            info!(
                namespace = daemon_set.metadata.namespace.as_deref().unwrap_or_default(),
                name = %daemon_set.name_any(),
                "DaemonSet found"
            );
        }

        let plan = plan(&pod, &daemon_sets, &self.config)?;
        info!(
            uid = %request.uid,
            injected = plan.injected,
            ignored = plan.ignored,
            operations = plan.patch.len(),
            "Computed sidecar patch"
        );

        if let Some(ref state) = self.health_state {
            state
                .metrics
                .record_injection(plan.injected as u64, plan.ignored as u64);
        }

        Ok(Decision::allow_with_patch(plan.patch))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use json_patch::{AddOperation, ReplaceOperation};
    use k8s_openapi::api::apps::v1::DaemonSetSpec;
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
    use std::collections::BTreeMap;

    fn container(name: &str, image: &str) -> Container {
        Container {
            name: name.to_string(),
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    fn create_pod(containers: Vec<Container>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers,
                ..Default::default()
            }),
            status: None,
        }
    }

    fn create_daemon_set(
        name: &str,
        labels: &[(&str, &str)],
        containers: Vec<Container>,
    ) -> DaemonSet {
        DaemonSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("kube-system".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(DaemonSetSpec {
                selector: LabelSelector::default(),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn replaced_containers(op: &PatchOperation) -> Vec<Container> {
        match op {
            PatchOperation::Replace(ReplaceOperation { path, value }) => {
                assert_eq!(path.as_str(), "/spec/containers");
                serde_json::from_value(value.clone()).unwrap()
            }
            other => panic!("expected replace, got {:?}", other),
        }
    }

    #[test]
    fn test_no_daemon_sets_only_annotation() {
        let pod = create_pod(vec![container("app", "app:1.0")]);
        let plan = plan(&pod, &[], &MutatorConfig::default()).unwrap();

        assert_eq!(plan.patch.len(), 1);
        assert_eq!(plan.injected, 0);
        match &plan.patch[0] {
            PatchOperation::Add(AddOperation { path, value }) => {
                assert_eq!(path.as_str(), "/metadata/annotations");
                assert_eq!(value, &json!({"origin": "fromMutation"}));
            }
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_single_daemon_set_appends_containers() {
        let pod = create_pod(vec![container("app", "app:1.0")]);
        let ds = create_daemon_set(
            "log-agent",
            &[("app", "log-agent")],
            vec![container("fluent-bit", "fluent-bit:2.2")],
        );

        let plan = plan(&pod, &[ds], &MutatorConfig::default()).unwrap();
        assert_eq!(plan.patch.len(), 2);
        let names: Vec<_> = replaced_containers(&plan.patch[0])
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["app", "fluent-bit"]);
        assert_eq!(plan.injected, 1);
    }

    #[test]
    fn test_ignored_label_key_skipped() {
        let pod = create_pod(vec![container("app", "app:1.0")]);
        let proxy = create_daemon_set(
            "kube-proxy",
            &[("k8s-app", "kube-proxy")],
            vec![container("kube-proxy", "kube-proxy:1.30")],
        );

        let plan = plan(&pod, &[proxy], &MutatorConfig::default()).unwrap();
        assert_eq!(plan.patch.len(), 1);
        assert_eq!(plan.ignored, 1);
        assert_eq!(plan.containers.len(), 1);
    }

    #[test]
    fn test_multiple_daemon_sets_are_cumulative() {
        let pod = create_pod(vec![container("app", "app:1.0")]);
        let first = create_daemon_set("a", &[], vec![container("a", "a:1")]);
        let ignored =
            create_daemon_set("cni", &[("k8s-app", "cni")], vec![container("cni", "cni:1")]);
        let second = create_daemon_set(
            "b",
            &[],
            vec![container("b1", "b:1"), container("b2", "b:1")],
        );

        let plan = plan(&pod, &[first, ignored, second], &MutatorConfig::default()).unwrap();
        assert_eq!(plan.patch.len(), 3);

        let names = |op: &PatchOperation| -> Vec<String> {
            replaced_containers(op)
                .into_iter()
                .map(|c| c.name)
                .collect()
        };
        assert_eq!(names(&plan.patch[0]), vec!["app", "a"]);
        assert_eq!(names(&plan.patch[1]), vec!["app", "a", "b1", "b2"]);
        assert!(matches!(plan.patch[2], PatchOperation::Add(_)));
        assert_eq!(plan.injected, 3);
    }

    #[test]
    fn test_empty_template_emits_no_replace() {
        let pod = create_pod(vec![container("app", "app:1.0")]);
        let ds = create_daemon_set("empty", &[], vec![]);

        let plan = plan(&pod, &[ds], &MutatorConfig::default()).unwrap();
        assert_eq!(plan.patch.len(), 1);
    }

    #[test]
    fn test_existing_annotations_preserved() {
        let mut pod = create_pod(vec![container("app", "app:1.0")]);
        pod.metadata.annotations =
            Some(BTreeMap::from([("team".to_string(), "web".to_string())]));

        let plan = plan(&pod, &[], &MutatorConfig::default()).unwrap();
        match &plan.patch[0] {
            PatchOperation::Add(AddOperation { path, value }) => {
                assert_eq!(path.as_str(), "/metadata/annotations/origin");
                assert_eq!(value, &json!("fromMutation"));
            }
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_ignore_list() {
        let pod = create_pod(vec![]);
        let proxy = create_daemon_set(
            "kube-proxy",
            &[("k8s-app", "kube-proxy")],
            vec![container("p", "p:1")],
        );
        let agent = create_daemon_set(
            "agent",
            &[("tier", "node")],
            vec![container("agent", "agent:1")],
        );

        let config = MutatorConfig::with_ignore_label_keys(["tier"]);
        let plan = plan(&pod, &[proxy, agent], &config).unwrap();
        let names: Vec<_> = plan.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["p"]);
        assert_eq!(plan.ignored, 1);
    }

    #[test]
    fn test_pod_without_spec_not_injected() {
        let pod = Pod::default();
        let ds = create_daemon_set("agent", &[], vec![container("agent", "agent:1")]);

        let plan = plan(&pod, &[ds], &MutatorConfig::default()).unwrap();
        assert_eq!(plan.patch.len(), 1);
        assert_eq!(plan.injected, 0);
    }
}
