//! Users: riders (students), drivers and admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RideError;
use crate::types::{Location, UserId, VehicleInfo, round_cents};

/// Role a user plays in the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Rider requesting transport
    Student,
    /// Driver accepting rides
    Driver,
    /// Operations staff
    Admin,
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identifier
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Role
    pub role: Role,
    /// Contact phone
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Whether the user is currently online / available
    pub is_online: bool,
    /// Last known location
    pub location: Option<Location>,
    /// Vehicle (drivers only)
    pub vehicle: Option<VehicleInfo>,
    /// Average of all ratings received
    pub rating: f64,
    /// Number of ratings folded into `rating`
    pub rating_count: u32,
    /// Unrounded sum behind `rating`
    #[serde(skip)]
    pub rating_sum: f64,
    /// Completed rides as rider or driver
    pub total_rides: u32,
    /// Cumulative earnings (drivers)
    pub earnings: f64,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates an offline user with zeroed counters
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            phone: None,
            email: None,
            is_online: false,
            location: None,
            vehicle: None,
            rating: 0.0,
            rating_count: 0,
            rating_sum: 0.0,
            total_rides: 0,
            earnings: 0.0,
            created_at,
        }
    }

    /// Attach a vehicle
    #[must_use]
    pub fn with_vehicle(mut self, vehicle: VehicleInfo) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    /// Whether the user drives
    #[must_use]
    pub fn is_driver(&self) -> bool {
        self.role == Role::Driver
    }

    /// Reject profiles that carry a vehicle without being a driver.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] for a blank name or a non-driver vehicle.
    pub fn validate(&self) -> Result<(), RideError> {
        if self.name.trim().is_empty() {
            return Err(RideError::validation("name is required"));
        }
        if self.vehicle.is_some() && !self.is_driver() {
            return Err(RideError::validation("only drivers may register a vehicle"));
        }
        if let Some(location) = &self.location {
            location.validate("location")?;
        }
        Ok(())
    }

    /// Fold one more rating into the running average.
    ///
    /// The raw sum is kept so that only the published average is rounded.
    pub fn record_rating(&mut self, rating: u8) {
        self.rating_sum += f64::from(rating);
        self.rating_count += 1;
        self.rating = round_cents(self.rating_sum / f64::from(self.rating_count));
    }

    /// Count a completed ride, crediting the fare when the user drove it.
    pub fn record_completed_ride(&mut self, fare: f64) {
        self.total_rides += 1;
        if self.is_driver() {
            self.earnings = round_cents(self.earnings + fare);
        }
    }
}
