//! Webhook process servers
//!
//! Runs the three listeners a deployed webhook needs:
//! - HTTPS admission webhook server (the API server calls this)
//! - Metrics server exposing the decision counters for scraping
//! - Health probe server for liveness/readiness checks
//!
//! The admission listener terminates TLS with a certificate read from disk;
//! provisioning and rotating that certificate is the deployment's job
//! (cert-manager or similar). Metrics and probes are plain HTTP on separate
//! listeners, matching the conventional port split so they are never
//! exposed through the webhook's TLS endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::MutationMetrics;
use crate::webhook::{webhook_router, WebhookState};

/// Configuration for the webhook servers
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the HTTPS admission webhook server
    pub webhook_addr: SocketAddr,
    /// Address for the metrics server
    pub metrics_addr: SocketAddr,
    /// Address for the health probe server
    pub probe_addr: SocketAddr,
    /// Directory containing the serving certificate (`tls.crt`, `tls.key`)
    pub cert_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            webhook_addr: format!("0.0.0.0:{}", crate::DEFAULT_WEBHOOK_PORT)
                .parse()
                .expect("hardcoded socket address is valid"),
            metrics_addr: format!("0.0.0.0:{}", crate::DEFAULT_METRICS_PORT)
                .parse()
                .expect("hardcoded socket address is valid"),
            probe_addr: format!("0.0.0.0:{}", crate::DEFAULT_PROBE_PORT)
                .parse()
                .expect("hardcoded socket address is valid"),
            cert_dir: PathBuf::from(crate::DEFAULT_CERT_DIR),
        }
    }
}

/// Error type for server operations
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to configure TLS from the certificate directory
    #[error("failed to configure TLS: {0}")]
    TlsConfig(String),
}

/// Webhook servers handle - manages the lifecycle of the HTTPS webhook,
/// metrics, and probe servers
pub struct WebhookServers {
    /// Whether the servers have been started
    running: AtomicBool,
    /// Configuration
    config: ServerConfig,
    /// Counters served by the metrics endpoint
    metrics: Arc<MutationMetrics>,
    /// Server handles
    handles: RwLock<Option<ServerHandles>>,
}

struct ServerHandles {
    webhook_handle: JoinHandle<()>,
    metrics_handle: JoinHandle<()>,
    probe_handle: JoinHandle<()>,
}

impl WebhookServers {
    /// Create a new WebhookServers instance
    pub fn new(config: ServerConfig, metrics: Arc<MutationMetrics>) -> Self {
        Self {
            running: AtomicBool::new(false),
            config,
            metrics,
            handles: RwLock::new(None),
        }
    }

    /// Check if the servers are running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the servers if not already running
    ///
    /// This is idempotent - calling multiple times is safe.
    /// Returns Ok(true) if servers were started, Ok(false) if already running.
    pub async fn ensure_running(&self, state: Arc<WebhookState>) -> Result<bool, ServerError> {
        // Use compare_exchange to atomically check and set
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Already running
            return Ok(false);
        }

        info!("Starting webhook servers...");

        let cert_path = self.config.cert_dir.join("tls.crt");
        let key_path = self.config.cert_dir.join("tls.key");
        let tls_config = match RustlsConfig::from_pem_file(&cert_path, &key_path).await {
            Ok(config) => config,
            Err(e) => {
                // Leave the handle reusable after a failed start
                self.running.store(false, Ordering::SeqCst);
                return Err(ServerError::TlsConfig(format!(
                    "{}: {e}",
                    cert_path.display()
                )));
            }
        };

        let webhook_addr = self.config.webhook_addr;
        let app_router = webhook_router(state);

        info!(addr = %webhook_addr, "Starting HTTPS webhook server");
        let webhook_handle = tokio::spawn(async move {
            if let Err(e) = axum_server::bind_rustls(webhook_addr, tls_config)
                .serve(app_router.into_make_service())
                .await
            {
                error!(error = %e, "Webhook server error");
            }
        });

        let metrics_addr = self.config.metrics_addr;
        let metrics_app = metrics_router(self.metrics.clone());

        info!(addr = %metrics_addr, "Starting metrics server");
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = axum_server::bind(metrics_addr)
                .serve(metrics_app.into_make_service())
                .await
            {
                error!(error = %e, "Metrics server error");
            }
        });

        let probe_addr = self.config.probe_addr;
        let probe_app = probe_router();

        info!(addr = %probe_addr, "Starting health probe server");
        let probe_handle = tokio::spawn(async move {
            if let Err(e) = axum_server::bind(probe_addr)
                .serve(probe_app.into_make_service())
                .await
            {
                error!(error = %e, "Probe server error");
            }
        });

        *self.handles.write().await = Some(ServerHandles {
            webhook_handle,
            metrics_handle,
            probe_handle,
        });

        info!("Webhook servers started successfully");
        Ok(true)
    }

    /// Shutdown the servers
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            // Not running
            return;
        }

        info!("Shutting down webhook servers...");

        if let Some(handles) = self.handles.write().await.take() {
            handles.webhook_handle.abort();
            handles.metrics_handle.abort();
            handles.probe_handle.abort();
        }

        info!("Webhook servers shut down");
    }
}

/// Create the metrics router
///
/// Serves the decision counters in Prometheus text format on GET /metrics.
pub fn metrics_router(metrics: Arc<MutationMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<MutationMetrics>>) -> String {
    metrics.render()
}

/// Create the health probe router
///
/// Serves GET /healthz and GET /readyz. The webhook has no dependencies to
/// degrade on, so both report ok whenever the process is serving.
pub fn probe_router() -> Router {
    Router::new()
        .route("/healthz", get(ping))
        .route("/readyz", get(ping))
}

async fn ping() -> &'static str {
    "ok"
}
