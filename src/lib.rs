//! jobttl - mutating admission webhook that defaults `ttlSecondsAfterFinished`
//! on `batch/v1` Jobs
//!
//! Clusters accumulate finished Jobs unless something sets a
//! time-to-live-after-completion on them. jobttl intercepts Job create/update
//! operations at admission time and injects a configured TTL value, so
//! finished Jobs become eligible for automatic cleanup without every workload
//! author having to remember the field.
//!
//! # Architecture
//!
//! The decision logic is a pure function over a single Job plus immutable
//! configuration. The admission transport deserializes the incoming
//! `AdmissionReview`, hands the Job to the defaulter, and serializes the
//! result back as a JSON patch. No Kubernetes client is needed: the webhook
//! never reads cluster state beyond the object under review.
//!
//! # Modules
//!
//! - [`selector`] - Label selector parsing and evaluation
//! - [`mutate`] - The TTL defaulting decision logic
//! - [`metrics`] - Decision outcome counters
//! - [`webhook`] - Admission review HTTP transport
//! - [`server`] - HTTPS webhook, metrics, and health probe listeners
//! - [`error`] - Error types for the webhook

#![deny(missing_docs)]

pub mod error;
pub mod metrics;
pub mod mutate;
pub mod selector;
pub mod server;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Defaults mirror the conventional webhook deployment layout: the TLS serving
// certificate is mounted where cert-manager puts it, and the ports match the
// usual metrics/probe/webhook split.

/// Default TTL in seconds applied to Jobs after they finish
pub const DEFAULT_TARGET_TTL: i32 = 3600;

/// Default port for the HTTPS admission webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default port for the metrics endpoint
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default port for the health probe endpoint
pub const DEFAULT_PROBE_PORT: u16 = 8081;

/// Default directory containing the serving certificate and key
///
/// The directory is expected to hold `tls.crt` and `tls.key`, the layout
/// produced by cert-manager and by the kubebuilder cert rotation machinery.
pub const DEFAULT_CERT_DIR: &str = "/tmp/k8s-webhook-server/serving-certs";
