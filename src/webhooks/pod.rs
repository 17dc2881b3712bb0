//! Decoding of the admitted object into a typed [`Pod`].

use k8s_openapi::api::core::v1::{Container, Pod};
use kube::core::DynamicObject;
use thiserror::Error;

/// Why the admitted object could not be read as a pod
#[derive(Error, Debug)]
pub enum PodParseError {
    #[error("admission request has no object")]
    MissingObject,

    #[error("could not parse pod: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse the request object into a [`Pod`]
pub fn parse_pod(object: Option<&DynamicObject>) -> Result<Pod, PodParseError> {
    let object = object.ok_or(PodParseError::MissingObject)?;
    let value = serde_json::to_value(object)?;
    Ok(serde_json::from_value(value)?)
}

/// Parse a raw serialized pod
pub fn parse_pod_bytes(raw: &[u8]) -> Result<Pod, PodParseError> {
    Ok(serde_json::from_slice(raw)?)
}

/// The pod's regular containers, empty when the pod has no spec
pub fn pod_containers(pod: &Pod) -> &[Container] {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default()
}
