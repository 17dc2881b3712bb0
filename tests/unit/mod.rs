// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for pod-admission-webhook.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation.

#[path = "../common/mod.rs"]
mod common;

mod decision_tests {
    use pod_admission_webhook::Decision;
    use pod_admission_webhook::webhooks::patch::{add_op, pointer};
    use serde_json::json;

    #[test]
    fn test_allow_with_patch_exposes_ops() {
        let op = add_op(pointer(["metadata", "annotations"]), json!({}));
        let decision = Decision::allow_with_patch(vec![op.clone()]);
        assert!(decision.is_allowed());
        assert_eq!(decision.patch(), &[op]);
        assert_eq!(decision.message(), None);
    }

    #[test]
    fn test_deny_message() {
        let decision = Decision::deny(String::from("blocked"));
        assert_eq!(decision, Decision::Deny { message: "blocked".to_string() });
    }
}

mod validator_tests {
    use kube::core::DynamicObject;
    use kube::core::admission::AdmissionRequest;
    use pod_admission_webhook::LatestTagValidator;
    use pod_admission_webhook::webhooks::LATEST_TAG_MESSAGE;
    use pod_admission_webhook::webhooks::policies::latest_tag::uses_latest_tag;

    use crate::common::fixtures::{PodBuilder, container, pod_review};

    #[test]
    fn test_uses_latest_tag() {
        assert!(uses_latest_tag(&container("a", "nginx:latest")));
        assert!(uses_latest_tag(&container("a", "ghcr.io/org/app:latest")));
        assert!(!uses_latest_tag(&container("a", "nginx")));
        assert!(!uses_latest_tag(&container("a", "nginx:1.21")));
        assert!(!uses_latest_tag(&container("a", "nginx:LATEST")));
    }

    #[test]
    fn test_admit_never_errors() {
        let validator = LatestTagValidator::new();
        let pod = PodBuilder::new("web").container("nginx", "nginx:latest").build();
        let request: AdmissionRequest<DynamicObject> = pod_review(&pod).try_into().unwrap();

        let decision = validator.admit(&request).unwrap();
        assert_eq!(decision.message(), Some(LATEST_TAG_MESSAGE));
    }

    #[test]
    fn test_admit_denies_missing_object() {
        let validator = LatestTagValidator::new();
        let mut request: AdmissionRequest<DynamicObject> =
            pod_review(&PodBuilder::new("web").build()).try_into().unwrap();
        request.object = None;

        let decision = validator.admit(&request).unwrap();
        assert!(!decision.is_allowed());
        assert!(decision.message().unwrap().contains("no object"));
    }
}

mod mutator_tests {
    use kube::core::DynamicObject;
    use kube::core::admission::AdmissionRequest;
    use pod_admission_webhook::webhooks::policies::sidecars::{is_ignored, template_containers};
    use pod_admission_webhook::{MutatorConfig, SidecarMutator};

    use crate::common::fixtures::{
        DaemonSetBuilder, FailingLister, PodBuilder, StaticLister, pod_review,
    };

    #[test]
    fn test_is_ignored_by_key_not_value() {
        let config = MutatorConfig::default();
        let proxy = DaemonSetBuilder::new("kube-proxy")
            .label("k8s-app", "anything")
            .build();
        let agent = DaemonSetBuilder::new("agent")
            .label("app", "k8s-app")
            .build();

        assert!(is_ignored(&proxy, &config));
        assert!(!is_ignored(&agent, &config));
    }

    #[test]
    fn test_unlabelled_daemon_set_not_ignored() {
        let ds = DaemonSetBuilder::new("agent").build();
        assert!(!is_ignored(&ds, &MutatorConfig::default()));
    }

    #[test]
    fn test_template_containers() {
        let ds = DaemonSetBuilder::new("agent")
            .container("a", "a:1")
            .container("b", "b:1")
            .build();
        let names: Vec<_> = template_containers(&ds).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_admit_propagates_listing_failure() {
        let mutator = SidecarMutator::new(FailingLister, MutatorConfig::default(), None);
        let pod = PodBuilder::new("web").container("app", "app:1").build();
        let request: AdmissionRequest<DynamicObject> = pod_review(&pod).try_into().unwrap();

        let err = mutator.admit(&request).await.unwrap_err();
        assert_eq!(err.reason(), "ClusterUnavailable");
    }

    #[tokio::test]
    async fn test_admit_without_daemon_sets_is_single_add() {
        let mutator = SidecarMutator::new(StaticLister::default(), MutatorConfig::default(), None);
        let pod = PodBuilder::new("web").container("app", "app:1").build();
        let request: AdmissionRequest<DynamicObject> = pod_review(&pod).try_into().unwrap();

        let decision = mutator.admit(&request).await.unwrap();
        assert!(decision.is_allowed());
        assert_eq!(decision.patch().len(), 1);
    }
}

mod config_tests {
    use pod_admission_webhook::config::{Config, DEFAULT_IGNORE_LABEL_KEY, MutatorConfig};

    #[test]
    fn test_default_ignore_key() {
        assert_eq!(DEFAULT_IGNORE_LABEL_KEY, "k8s-app");
        assert!(
            MutatorConfig::default()
                .ignore_label_keys
                .contains(DEFAULT_IGNORE_LABEL_KEY)
        );
    }

    #[test]
    fn test_health_port_override() {
        let config = Config::from_lookup(|name| {
            (name == "HEALTH_PORT").then(|| "9102".to_string())
        })
        .unwrap();
        assert_eq!(config.health_port, 9102);
        assert_eq!(config.webhook_port, 9443);
    }
}
