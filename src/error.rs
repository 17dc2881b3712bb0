//! Error types for the admission webhook.
//!
//! Only infrastructure failures live here. Policy outcomes, including malformed
//! pod payloads, are expressed as [`crate::webhooks::Decision`] values instead.

use thiserror::Error;

/// Error type for admission callbacks
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (e.g. listing DaemonSets failed)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error while building patch values
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The JSON patch could not be attached to the admission response
    #[error("Failed to encode JSON patch: {0}")]
    Patch(#[from] kube::core::admission::SerializePatchError),
}

impl Error {
    /// Short machine-readable reason used in denial messages and logs
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Kube(_) => "ClusterUnavailable",
            Error::Serialization(_) | Error::Patch(_) => "InternalError",
        }
    }
}

/// Result type alias for admission callbacks
pub type Result<T> = std::result::Result<T, Error>;
