//! User profiles and driver availability.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use campus_rides_core::{Location, User, UserId};
use campus_rides_runtime::users::{NewUser, UserPatch};
use serde::Deserialize;

use crate::error::AppError;
use crate::extractors::{ApiJson, CorrelationId};
use crate::state::AppState;

/// Body of `PUT /api/users/:id/availability`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    /// New availability
    pub is_online: bool,
}

/// Body of `POST /api/drivers/:id/location`.
#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    /// Current position
    pub location: Location,
}

/// `POST /api/users`
///
/// # Errors
///
/// 422 for a blank name or a vehicle on a non-driver.
pub async fn register(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    ApiJson(new_user): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = state.services.users.register(new_user).await?;
    tracing::info!(correlation_id = %correlation_id.0, user_id = %user.id, role = ?user.role, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /api/users/:id`
///
/// # Errors
///
/// 404 for an unknown user.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.services.users.get(&UserId::new(id)).await?))
}

/// `PATCH /api/users/:id`
///
/// # Errors
///
/// 404 for an unknown user, 422 for invalid fields.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<UserPatch>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.services.users.update(&UserId::new(id), patch).await?))
}

/// `PUT /api/users/:id/availability`
///
/// # Errors
///
/// 404 for an unknown user.
pub async fn set_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AvailabilityRequest>,
) -> Result<Json<User>, AppError> {
    let user = state
        .services
        .users
        .set_availability(&UserId::new(id), request.is_online)
        .await?;
    Ok(Json(user))
}

/// `GET /api/drivers/online`
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn online_drivers(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.services.users.online_drivers().await?))
}

/// `POST /api/drivers/:id/location`
///
/// # Errors
///
/// 422 for out-of-range coordinates or a non-driver, 404 for an unknown user.
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<LocationRequest>,
) -> Result<Json<User>, AppError> {
    let driver = state
        .services
        .users
        .update_driver_location(&UserId::new(id), request.location)
        .await?;
    Ok(Json(driver))
}
