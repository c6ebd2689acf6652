//! Mutating admission webhook transport for Job TTL defaulting
//!
//! This module provides the HTTP side of the webhook: it intercepts Job
//! create/update operations delivered as `AdmissionReview` requests and
//! returns a JSON patch injecting the default `ttlSecondsAfterFinished`.
//!
//! The transport owns deserialization, patch serialization, and the mapping
//! from decision results to admission responses. The decision itself lives
//! in [`crate::mutate`] and never sees the wire format.

pub mod job;

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::mutate::TtlDefaulter;

/// Shared state for webhook handlers
pub struct WebhookState {
    /// The TTL defaulting decision engine
    pub defaulter: TtlDefaulter,
}

impl WebhookState {
    /// Create a new webhook state around the given defaulter
    pub fn new(defaulter: TtlDefaulter) -> Self {
        Self { defaulter }
    }
}

/// Create the webhook router with all mutation endpoints
///
/// Currently supports:
/// - POST /mutate/jobs - Default the TTL on batch/v1 Jobs
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate/jobs", post(job::mutate_handler))
        .with_state(state)
}
