// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Integration tests for pod-admission-webhook
//!
//! These tests require a running Kubernetes cluster accessible via kubeconfig.
//! Tests are marked with #[ignore] and must be run explicitly:
//!
//! ```bash
//! cargo test --test integration -- --ignored
//! ```
//!
//! The tests use your existing kubeconfig (~/.kube/config or KUBECONFIG env var).
//! Each test creates its own namespace, so tests can run in parallel.

// Shared test fixtures (used by unit, functional, and integration)
#[path = "../common/mod.rs"]
mod common;

mod namespace;


pub use cluster::*;
pub use namespace::*;
