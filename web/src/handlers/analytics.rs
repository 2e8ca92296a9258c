//! Dashboard analytics.

use axum::{Json, extract::State};
use campus_rides_core::{DailyAnalytics, DemandSeries, RevenueSeries};

use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/analytics/today`: today's rollup, zeroed if nothing happened yet.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn today(State(state): State<AppState>) -> Result<Json<DailyAnalytics>, AppError> {
    Ok(Json(state.services.analytics.today_snapshot().await?))
}

/// `GET /api/analytics/demand-prediction`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn demand_prediction(State(state): State<AppState>) -> Json<DemandSeries> {
    Json(state.services.analytics.demand_prediction())
}

/// `GET /api/analytics/revenue`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn revenue(State(state): State<AppState>) -> Json<RevenueSeries> {
    Json(state.services.analytics.revenue_trend())
}
