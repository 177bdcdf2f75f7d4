mod auth;
mod config;
mod health;
mod http;
mod metrics;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::AccessPolicy;
use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::transport::http_backend::GitHttpBackend;
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "gitgate", about = "Git Smart HTTP gateway")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/gitgate/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Immutable access policy loaded once at startup.
    pub policy: AccessPolicy,
    /// Backend transport; a trait object so tests can script the backend.
    pub transport: Arc<dyn Transport>,
    pub metrics: MetricsRegistry,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState) -> Result<()> {
    let listen_addr: SocketAddr = state
        .config
        .listen
        .parse()
        .context("invalid listen address")?;

    let app = http::handler::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting gitgate");

    // ---- Access policy ----
    let policy = AccessPolicy {
        private: config.repository.private,
        readers: config.access.readers.clone(),
        writers: config.access.writers.clone(),
    };
    tracing::info!(
        private = policy.private,
        readers = policy.readers.len(),
        writers = policy.writers.len(),
        root = %config.repository.root.display(),
        "access policy loaded"
    );

    // ---- Backend transport ----
    let transport: Arc<dyn Transport> = Arc::new(GitHttpBackend::new(
        config.backend.command.clone(),
        config.repository.root.clone(),
        config.backend.timeout_secs.map(Duration::from_secs),
    ));

    // ---- Metrics ----
    let metrics = MetricsRegistry::new();

    // ---- App state ----
    let state = AppState {
        config: Arc::clone(&config),
        policy,
        transport,
        metrics,
    };

    run_http_server(state).await?;

    tracing::info!("gitgate shut down cleanly");
    Ok(())
}
