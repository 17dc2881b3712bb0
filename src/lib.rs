//! pod-admission-webhook library crate
//!
//! Admission callbacks for pods (`:latest` tag validation, DaemonSet sidecar
//! injection), the HTTPS dispatcher serving them, and the health/metrics server.

pub mod cluster;
pub mod config;
pub mod error;
pub mod health;
pub mod webhooks;

pub use cluster::{DaemonSetLister, KubeDaemonSetLister};
pub use config::{Config, ConfigError, MutatorConfig};
pub use error::{Error, Result};
pub use health::HealthState;
pub use webhooks::{
    Decision, LatestTagValidator, SidecarMutator, WebhookError, WebhookState, run_webhook_server,
};
