//! Identifiers and value objects shared by every Campus Rides component.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::RideError;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a user (rider, driver or admin).
///
/// User identities are issued by the external account system, so this is an
/// opaque string rather than a generated UUID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a `UserId` from any string-like value
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a fresh random `UserId`
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Unique identifier for a ride
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(Uuid);

impl RideId {
    /// Creates a new random `RideId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RideId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RideId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a notification ledger entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new random `NotificationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `NotificationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a pool suggestion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolSuggestionId(Uuid);

impl PoolSuggestionId {
    /// Creates a new random `PoolSuggestionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PoolSuggestionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolSuggestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// A point on the map with a human-readable address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
    /// Display address
    pub address: String,
}

impl Location {
    /// Creates a new location
    #[must_use]
    pub fn new(lat: f64, lng: f64, address: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            address: address.into(),
        }
    }

    /// Check coordinate ranges and that the address is present.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] naming `field` when the coordinates are out of
    /// range or not finite, or when the address is blank.
    pub fn validate(&self, field: &str) -> Result<(), RideError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(RideError::validation(format!(
                "{field}: latitude {} is out of range",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(RideError::validation(format!(
                "{field}: longitude {} is out of range",
                self.lng
            )));
        }
        if self.address.trim().is_empty() {
            return Err(RideError::validation(format!("{field}: address is required")));
        }
        Ok(())
    }
}

/// Vehicle registered to a driver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Registration plate
    pub plate_number: String,
    /// Paint colour
    pub color: String,
}

/// Rounds a currency amount to whole cents.
#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn location_rejects_out_of_range_latitude() {
        let loc = Location::new(91.0, 10.0, "North of north");
        let err = loc.validate("pickup").unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("pickup"));
    }

    #[test]
    fn location_rejects_blank_address() {
        assert!(Location::new(12.97, 77.59, "  ").validate("drop").is_err());
        assert!(Location::new(12.97, 77.59, "MBU Main Gate").validate("drop").is_ok());
    }

    #[test]
    fn user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::new("driver-1")).unwrap();
        assert_eq!(json, r#""driver-1""#);
    }

    #[test]
    fn round_cents_keeps_two_decimals() {
        assert!((round_cents(11.254_9) - 11.25).abs() < f64::EPSILON);
        assert!((round_cents(0.125 * 100.0) - 12.5).abs() < f64::EPSILON);
    }
}
