//! Admission webhook server.
//!
//! Provides HTTPS endpoints for the pod admission webhooks:
//! - `POST /validate` - `:latest` image tag policy
//! - `POST /mutate` - DaemonSet sidecar injection
//!
//! To enable webhooks:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create the ValidatingWebhookConfiguration and MutatingWebhookConfiguration
//! 3. Mount the TLS certificate secret to the webhook pod at /etc/webhook/certs/

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cluster::DaemonSetLister;
use crate::error::{Error, Result};
use crate::health::HealthState;
use crate::webhooks::policies::Decision;
use crate::webhooks::policies::latest_tag::LatestTagValidator;
use crate::webhooks::policies::sidecars::SidecarMutator;

/// Route of the validating webhook
pub const VALIDATE_PATH: &str = "/validate";
/// Route of the mutating webhook
pub const MUTATE_PATH: &str = "/mutate";

/// Which admission callback handles a review
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Webhook {
    Validate,
    Mutate,
}

impl Webhook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Webhook::Validate => "validate",
            Webhook::Mutate => "mutate",
        }
    }
}

/// How a review ended, for logs and metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Allowed,
    Denied,
    /// Infrastructure failure, reported to the API server as a denial
    Error,
    /// Not a pod creation, passed through untouched
    Skipped,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Allowed => "allowed",
            Outcome::Denied => "denied",
            Outcome::Error => "error",
            Outcome::Skipped => "skipped",
        }
    }
}

/// Shared state for webhook handlers
pub struct WebhookState<L> {
    pub validator: LatestTagValidator,
    pub mutator: SidecarMutator<L>,
    pub health_state: Option<Arc<HealthState>>,
}

impl<L: DaemonSetLister> WebhookState<L> {
    pub fn new(mutator: SidecarMutator<L>, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            validator: LatestTagValidator::new(),
            mutator,
            health_state,
        }
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason(
    request: &AdmissionRequest<DynamicObject>,
    message: &str,
    reason: &str,
) -> AdmissionResponse {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request).deny(full_message)
}

/// Only pod creations are evaluated; everything else passes through
fn is_pod_create(request: &AdmissionRequest<DynamicObject>) -> bool {
    request.operation == Operation::Create
        && request.kind.group.is_empty()
        && request.kind.kind == "Pod"
}

/// Turn a callback result into the response sent back to the API server
fn to_response(
    request: &AdmissionRequest<DynamicObject>,
    result: Result<Decision>,
) -> (Outcome, AdmissionResponse) {
    let failure = |e: &Error| {
        error!(uid = %request.uid, reason = e.reason(), error = %e, "Admission callback failed");
        (
            Outcome::Error,
            deny_with_reason(request, &e.to_string(), e.reason()),
        )
    };

    match result {
        Ok(Decision::Allow { patch }) if patch.is_empty() => {
            (Outcome::Allowed, AdmissionResponse::from(request))
        }
        Ok(Decision::Allow { patch }) => {
            match AdmissionResponse::from(request).with_patch(json_patch::Patch(patch)) {
                Ok(response) => (Outcome::Allowed, response),
                Err(e) => failure(&Error::from(e)),
            }
        }
        Ok(Decision::Deny { message }) => {
            warn!(uid = %request.uid, message = %message, "Admission request denied");
            (Outcome::Denied, AdmissionResponse::from(request).deny(message))
        }
        Err(e) => failure(&e),
    }
}

/// Run one admission review through `webhook`.
///
/// Returns the HTTP status and the review to send back. Malformed reviews
/// (no request) get 400; every decision, including infrastructure failures,
/// is a 200 carrying an allow or a denial.
pub async fn handle_review<L: DaemonSetLister>(
    state: &WebhookState<L>,
    webhook: Webhook,
    review: AdmissionReview<DynamicObject>,
) -> (StatusCode, AdmissionReview<DynamicObject>) {
    let started = Instant::now();

    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(webhook = webhook.as_str(), error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e)).into_review(),
            );
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        webhook = webhook.as_str(),
        operation = ?request.operation,
        kind = %request.kind.kind,
        namespace = ?request.namespace,
        name = %request.name,
        dry_run = request.dry_run,
        "Processing admission request"
    );

    let (outcome, response) = if is_pod_create(&request) {
        let result = match webhook {
            Webhook::Validate => state.validator.admit(&request),
            Webhook::Mutate => state.mutator.admit(&request).await,
        };
        to_response(&request, result)
    } else {
        debug!(uid = %uid, "Not a pod creation, allowing unchanged");
        (Outcome::Skipped, AdmissionResponse::from(&request))
    };

    if let Some(ref health) = state.health_state {
        health.metrics.record_admission(
            webhook.as_str(),
            outcome.as_str(),
            started.elapsed().as_secs_f64(),
        );
    }

    info!(
        uid = %uid,
        webhook = webhook.as_str(),
        outcome = outcome.as_str(),
        "Admission request handled"
    );
    (StatusCode::OK, response.into_review())
}

/// Create the webhook router
pub fn create_webhook_router<L>(state: Arc<WebhookState<L>>) -> Router
where
    L: DaemonSetLister + 'static,
{
    Router::new()
        .route(VALIDATE_PATH, post(validate_pod::<L>))
        .route(MUTATE_PATH, post(mutate_pod::<L>))
        .with_state(state)
}

async fn validate_pod<L: DaemonSetLister>(
    State(state): State<Arc<WebhookState<L>>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let (status, review) = handle_review(&state, Webhook::Validate, review).await;
    (status, Json(review))
}

async fn mutate_pod<L: DaemonSetLister>(
    State(state): State<Arc<WebhookState<L>>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> impl IntoResponse {
    let (status, review) = handle_review(&state, Webhook::Mutate, review).await;
    (status, Json(review))
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS
///
/// Binds to `0.0.0.0:<port>` and serves the validate and mutate endpoints.
/// Readiness is flipped on once the certificate has been loaded.
///
/// # Arguments
/// * `state` - Shared webhook state (callbacks and metrics)
/// * `port` - Listen port
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server<L>(
    state: Arc<WebhookState<L>>,
    port: u16,
    cert_path: &str,
    key_path: &str,
) -> std::result::Result<(), WebhookError>
where
    L: DaemonSetLister + 'static,
{
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let health_state = state.health_state.clone();
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Webhook server listening with TLS");

    if let Some(ref health) = health_state {
        health.set_ready(true).await;
    }

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
