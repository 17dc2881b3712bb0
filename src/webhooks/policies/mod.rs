//! Admission policies for pods.
//!
//! - [`latest_tag`]: validating, rejects `:latest` images
//! - [`sidecars`]: mutating, injects DaemonSet containers and marks the pod

pub mod latest_tag;
pub mod sidecars;

use json_patch::PatchOperation;

/// Outcome of an admission policy.
///
/// A denial always carries a message and never a patch; an allow may carry a
/// patch. Infrastructure failures are not decisions and travel as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow { patch: Vec<PatchOperation> },
    Deny { message: String },
}

impl Decision {
    /// Allow without modifying the object
    pub fn allow() -> Self {
        Decision::Allow { patch: Vec::new() }
    }

    /// Allow and apply `patch` in order
    pub fn allow_with_patch(patch: Vec<PatchOperation>) -> Self {
        Decision::Allow { patch }
    }

    /// Deny with a user-visible message
    pub fn deny(message: impl Into<String>) -> Self {
        Decision::Deny {
            message: message.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    /// Denial message, if denied
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::Deny { message } => Some(message),
            Decision::Allow { .. } => None,
        }
    }

    /// Patch operations, empty when denied
    pub fn patch(&self) -> &[PatchOperation] {
        match self {
            Decision::Allow { patch } => patch,
            Decision::Deny { .. } => &[],
        }
    }
}
