//! Ride lifecycle endpoints.
//!
//! Every mutating handler goes through [`RideEngine`](campus_rides_runtime::engine::RideEngine),
//! so the HTTP surface cannot bypass the state machine. Errors map to
//! 422 (validation), 404 (unknown id), 409 (lost race, wrong state, busy driver) and
//! 503 (store unavailable).

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use campus_rides_core::{PoolSuggestion, Ride, RideRequest, UserId};
use campus_rides_runtime::engine::RidePatch;
use serde::Deserialize;

use super::ride_id;
use crate::error::AppError;
use crate::extractors::{ApiJson, CorrelationId, OptionalJson};
use crate::state::AppState;

/// Body of `POST /api/rides/:id/accept`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    /// Driver taking the ride
    pub driver_id: UserId,
}

/// Body of `POST /api/rides/:id/complete`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    /// Minutes the trip actually took
    pub actual_duration: Option<u32>,
}

/// Body of `POST /api/rides/:id/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Rider or assigned driver cancelling
    pub actor: UserId,
}

/// Body of `POST /api/rides/:id/rating`.
#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    /// 1 to 5 stars
    pub rating: u8,
    /// Optional free text
    pub feedback: Option<String>,
}

/// `POST /api/rides`: request a ride (201).
///
/// # Errors
///
/// 422 for invalid input, 409 when the rider already has an active ride.
pub async fn create(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    ApiJson(request): ApiJson<RideRequest>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state.services.engine.create(request).await?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        ride_id = %ride.id,
        rider_id = %ride.rider_id,
        "Ride requested"
    );
    Ok((StatusCode::CREATED, Json(ride)))
}

/// `GET /api/rides/available`: waiting rides, newest first.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn available(State(state): State<AppState>) -> Result<Json<Vec<Ride>>, AppError> {
    Ok(Json(state.services.engine.list_available().await?))
}

/// `GET /api/rides/user/:userId`: every ride the user is party to, newest first.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn for_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = state.services.engine.list_for_user(&UserId::new(user_id)).await?;
    Ok(Json(rides))
}

/// `GET /api/rides/active/:userId`: the user's active ride or `null`.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn active(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Option<Ride>>, AppError> {
    let ride = state.services.engine.active_for(&UserId::new(user_id)).await?;
    Ok(Json(ride))
}

/// `GET /api/rides/:id`
///
/// # Errors
///
/// 404 for an unknown ride.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.services.engine.get(ride_id(&id)?).await?))
}

/// `PATCH /api/rides/:id`: partial update routed through the lifecycle.
///
/// # Errors
///
/// 404, 409 or 422 as for the matching lifecycle command.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<RidePatch>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.services.engine.update(ride_id(&id)?, patch).await?))
}

/// `POST /api/rides/:id/accept`
///
/// # Errors
///
/// 409 when the ride is no longer waiting or the driver is busy.
pub async fn accept(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AcceptRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .services
        .engine
        .accept(ride_id(&id)?, &request.driver_id)
        .await?;
    tracing::info!(
        correlation_id = %correlation_id.0,
        ride_id = %ride.id,
        driver_id = %request.driver_id,
        "Ride accepted"
    );
    Ok(Json(ride))
}

/// `POST /api/rides/:id/start`
///
/// # Errors
///
/// 409 unless the ride is accepted.
pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.services.engine.start(ride_id(&id)?).await?))
}

/// `POST /api/rides/:id/complete`; the body may be empty.
///
/// # Errors
///
/// 409 unless the ride is accepted or in progress, 400/422 for a body that is
/// present but unusable.
pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<CompleteRequest>,
) -> Result<Json<Ride>, AppError> {
    let request = body.unwrap_or_default();
    let ride = state
        .services
        .engine
        .complete(ride_id(&id)?, request.actual_duration)
        .await?;
    Ok(Json(ride))
}

/// `POST /api/rides/:id/cancel`
///
/// # Errors
///
/// 409 once the trip has started, 422 for an actor who is not a party.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CancelRequest>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.services.engine.cancel(ride_id(&id)?, request.actor).await?))
}

/// `POST /api/rides/:id/rating`
///
/// # Errors
///
/// 422 for a rating outside 1..=5, 409 for an unfinished or already rated ride.
pub async fn rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<RatingRequest>,
) -> Result<Json<Ride>, AppError> {
    let ride = state
        .services
        .engine
        .rate(ride_id(&id)?, request.rating, request.feedback)
        .await?;
    Ok(Json(ride))
}

/// `GET /api/rides/:id/pool-suggestions`
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn pool_suggestions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PoolSuggestion>>, AppError> {
    Ok(Json(state.services.pool.list(ride_id(&id)?).await?))
}
