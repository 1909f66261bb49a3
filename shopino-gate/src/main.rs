//! Shopino Gate - signature-verifying gateway.
//!
//! This binary provides a thin web server that:
//! - Loads the verification credential once at startup (fatal if unavailable)
//! - Verifies the signature of every shop API call
//! - Forwards allowed calls to the shop backend
//! - Receives signed shop webhooks when a webhook secret is configured

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shopino::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("gate_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        auth_mode = %config.auth_mode,
        signature_header = %config.signature_header,
        signature_max_age = ?config.signature_max_age,
        upstream_url = %config.upstream_url,
        webhook_receiver_enabled = config.webhook_secret.is_some(),
        "config_loaded"
    );

    // Credential problems stop the process before any route is served
    let state = AppState::new(config).context("Refusing to start")?;
    info!(
        algorithm = state.gate.credential().algorithm(),
        "credential_loaded"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "gate_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("gate_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("gate_shutting_down");
}
