//! HTTP request handlers, one module per resource.

use campus_rides_core::{NotificationId, RideId};
use uuid::Uuid;

use crate::error::AppError;

pub mod analytics;
pub mod health;
pub mod notifications;
pub mod rides;
pub mod users;
pub mod websocket;

pub use health::{health_check, metrics};

/// An id that is not a UUID cannot name a stored ride.
fn ride_id(raw: &str) -> Result<RideId, AppError> {
    Uuid::parse_str(raw)
        .map(RideId::from_uuid)
        .map_err(|_| AppError::not_found("Ride", raw))
}

fn notification_id(raw: &str) -> Result<NotificationId, AppError> {
    Uuid::parse_str(raw)
        .map(NotificationId::from_uuid)
        .map_err(|_| AppError::not_found("Notification", raw))
}
