//! Campus Rides server.
//!
//! This binary:
//! - Loads `.env` and the environment configuration
//! - Installs the Prometheus recorder
//! - Builds the service graph over the in-memory store and seeds demo users
//! - Serves HTTP and the live event channel until Ctrl+C or SIGTERM
//!
//! # Usage
//!
//! ```bash
//! PORT=5000 RUST_LOG=info cargo run --bin server
//! ```

use std::future::IntoFuture;
use std::sync::Arc;

use anyhow::Context;
use campus_rides_core::SystemClock;
use campus_rides_runtime::memory::InMemoryStore;
use campus_rides_runtime::{Services, metrics};
use campus_rides_web::{AppState, Config, router};
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,campus_rides=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    tracing::info!(
        address = %config.bind_address(),
        seed_demo_data = config.seed_demo_data,
        metrics_enabled = config.metrics_enabled,
        "Configuration loaded"
    );

    let metrics_handle = if config.metrics_enabled {
        metrics::install_recorder().context("failed to install metrics recorder")?
    } else {
        None
    };

    let services = Services::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(SystemClock),
        config.runtime_settings(),
    );
    if config.seed_demo_data {
        let seeded = services.users.seed_demo().await.context("failed to seed demo users")?;
        tracing::info!(users = seeded.len(), "Demo users seeded");
    }

    let app = router(AppState::new(services).with_metrics(metrics_handle));
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    tracing::info!(address = %config.bind_address(), "Server listening");

    let stop = Arc::new(Notify::new());
    let stopped = Arc::clone(&stop);
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stopped.notified().await })
            .into_future(),
    );

    shutdown_signal().await;
    stop.notify_one();
    tracing::info!(timeout = ?config.server.shutdown_timeout, "Shutting down gracefully");

    // Live connections never finish on their own, so draining is bounded.
    match tokio::time::timeout(config.server.shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => tracing::info!("Graceful shutdown complete"),
        Ok(Ok(Err(e))) => return Err(e).context("server error"),
        Ok(Err(e)) => return Err(e).context("server task failed"),
        Err(_) => tracing::warn!("Shutdown timed out, dropping open connections"),
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
