//! Webhook module for pod admission requests.
//!
//! This module provides the two pod-creation callbacks and the HTTPS dispatcher
//! that serves them:
//! - Validating: reject images tagged `:latest`
//! - Mutating: inject DaemonSet sidecar containers and mark the pod

pub mod patch;
pub mod pod;
pub mod policies;
mod server;

pub use policies::Decision;
pub use policies::latest_tag::{LATEST_TAG_MESSAGE, LatestTagValidator};
pub use policies::sidecars::{ORIGIN_ANNOTATION_KEY, ORIGIN_ANNOTATION_VALUE, SidecarMutator};
pub use server::{
    MUTATE_PATH, Outcome, VALIDATE_PATH, Webhook, WebhookError, WebhookState,
    create_webhook_router, handle_review, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
