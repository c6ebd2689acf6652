//! jobttl - mutating admission webhook defaulting Job TTLs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobttl::metrics::MutationMetrics;
use jobttl::mutate::{MutationConfig, TtlDefaulter};
use jobttl::server::{ServerConfig, WebhookServers};
use jobttl::webhook::WebhookState;

/// Mutating admission webhook that defaults ttlSecondsAfterFinished on
/// batch/v1 Jobs
#[derive(Parser, Debug)]
#[command(name = "jobttl", version, about, long_about = None)]
struct Cli {
    /// The address the metric endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: SocketAddr,

    /// The address the probe endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// The address the HTTPS webhook server binds to
    #[arg(long, default_value = "0.0.0.0:9443")]
    webhook_bind_address: SocketAddr,

    /// The directory that contains the server key and certificate
    #[arg(long, default_value = jobttl::DEFAULT_CERT_DIR)]
    cert_dir: PathBuf,

    /// The target TTL in seconds for jobs after they finish
    #[arg(long, env = "JOBTTL_TARGET_TTL", default_value_t = jobttl::DEFAULT_TARGET_TTL)]
    target_ttl: i32,

    /// Label selector to match jobs for TTL patching
    #[arg(long, env = "JOBTTL_LABEL_SELECTOR", default_value = "")]
    label_selector: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs.
    // The webhook cannot terminate TLS without a working provider.
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             The webhook cannot serve TLS without a working implementation.",
            e
        );
        std::process::exit(1);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mutation_config = MutationConfig {
        target_ttl: cli.target_ttl,
        label_selector: cli.label_selector,
    };

    // Reject a malformed selector or TTL before serving any admission
    // traffic, instead of denying every request at runtime.
    mutation_config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    tracing::info!(
        target_ttl = mutation_config.target_ttl,
        label_selector = %mutation_config.label_selector,
        "jobttl webhook starting"
    );

    let metrics = Arc::new(MutationMetrics::new());
    let defaulter = TtlDefaulter::new(mutation_config, metrics.clone());
    let state = Arc::new(WebhookState::new(defaulter));

    let server_config = ServerConfig {
        webhook_addr: cli.webhook_bind_address,
        metrics_addr: cli.metrics_bind_address,
        probe_addr: cli.health_probe_bind_address,
        cert_dir: cli.cert_dir,
    };

    let servers = Arc::new(WebhookServers::new(server_config, metrics));
    servers
        .ensure_running(state)
        .await
        .map_err(|e| anyhow::anyhow!("failed to start webhook servers: {e}"))?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to listen for shutdown signal: {e}"))?;

    servers.shutdown().await;

    tracing::info!("jobttl webhook shutting down");
    Ok(())
}
