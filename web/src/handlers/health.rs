//! Liveness and metrics endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Liveness body.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `"ok"` when the process answers
    pub status: &'static str,
    /// Open live-event connections
    pub connections: usize,
}

/// `GET /health`
///
/// Does not touch the store.
pub async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        connections: state.services.bus.connection_count().await,
    })
}

/// `GET /metrics`: Prometheus text exposition.
///
/// # Errors
///
/// 404 when the server runs with metrics disabled.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .ok_or_else(|| AppError::new(StatusCode::NOT_FOUND, "Metrics are disabled".to_string(), "not_found"))
}
