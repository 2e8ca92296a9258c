//! Notification history.

use axum::{
    Json,
    extract::{Path, State},
};
use campus_rides_core::{Notification, UserId};

use super::notification_id;
use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/notifications/:userId`: newest first.
///
/// # Errors
///
/// 503 when the store is unavailable.
pub async fn list(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let notifications = state.services.ledger.list(&UserId::new(user_id)).await?;
    Ok(Json(notifications))
}

/// `PATCH /api/notifications/:id/read`
///
/// # Errors
///
/// 404 for an unknown notification.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    let id = notification_id(&id)?;
    Ok(Json(state.services.ledger.mark_read(id).await?))
}
