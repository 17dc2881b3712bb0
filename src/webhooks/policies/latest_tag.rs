//! `:latest` image tag policy.
//!
//! Validating: denies a pod as soon as one of its containers references an
//! image ending in `:latest`. Untagged images (`nginx`) are allowed.

use k8s_openapi::api::core::v1::{Container, Pod};
use kube::core::DynamicObject;
use kube::core::admission::AdmissionRequest;
use tracing::debug;

use super::Decision;
use crate::error::Result;
use crate::webhooks::pod::{parse_pod, pod_containers};

/// Denial message for `:latest` images
pub const LATEST_TAG_MESSAGE: &str = "You cannot use the tag 'latest' in a container.";

const LATEST_SUFFIX: &str = ":latest";

/// Whether the container's image explicitly uses the `latest` tag
pub fn uses_latest_tag(container: &Container) -> bool {
    container
        .image
        .as_deref()
        .is_some_and(|image| image.ends_with(LATEST_SUFFIX))
}

/// Check a parsed pod
pub fn validate(pod: &Pod) -> Decision {
    match pod_containers(pod).iter().find(|c| uses_latest_tag(c)) {
        Some(container) => {
            debug!(
                container = %container.name,
                image = container.image.as_deref().unwrap_or_default(),
                "Container uses the latest tag"
            );
            Decision::deny(LATEST_TAG_MESSAGE)
        }
        None => Decision::allow(),
    }
}

/// Validating callback for pod creation
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestTagValidator;

impl LatestTagValidator {
    pub fn new() -> Self {
        Self
    }

    /// Admit or deny the pod in `request`.
    ///
    /// A payload that does not parse as a pod is denied with the parse error.
    /// Never returns `Err`.
    pub fn admit(&self, request: &AdmissionRequest<DynamicObject>) -> Result<Decision> {
        let pod = match parse_pod(request.object.as_ref()) {
            Ok(pod) => pod,
            Err(e) => return Ok(Decision::deny(e.to_string())),
        };
        Ok(validate(&pod))
    }
}
