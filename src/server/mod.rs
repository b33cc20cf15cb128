//! HTTP surface for `--serve` mode.
//!
//! # Endpoints
//!
//! - `GET /analytics`: combined results across every source, always 200
//! - `GET /api/results`: this instance's own tally, read by peers
//! - `POST /vote`: `{"vote": "cat"}`, recorded by the writable source
//! - `GET /health`: liveness

pub mod routes;

use crate::analysis::Aggregator;
use crate::config::Config;
use crate::sources::remote::RESULTS_PATH;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use routes::{analytics_handler, health_handler, results_handler, vote_handler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

pub struct AppState {
    pub aggregator: Aggregator,
    /// Id of this deployment.
    pub instance: String,
}

impl AppState {
    pub fn new(aggregator: Aggregator, instance: &str) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            instance: instance.to_string(),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analytics", get(analytics_handler))
        .route(RESULTS_PATH, get(results_handler))
        .route("/results", get(results_handler))
        .route("/vote", post(vote_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `config.server.bind` and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: &Config, aggregator: Aggregator) -> Result<()> {
    let state = AppState::new(aggregator, &config.general.instance);
    let app = router(state);

    let address = config.server.bind.as_str();
    info!("Binding to {address}");

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(
        "Serving instance '{}' on {address}",
        config.general.instance
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
