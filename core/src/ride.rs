//! The ride entity and its status vocabulary.
//!
//! # State Machine
//!
//! ```text
//! waiting ──accept──> accepted ──start──> in_progress ──complete──> completed
//!    │                   │ └────────────complete──────────────────────┘
//!    └──cancel──┐        └──cancel──┐
//!               ▼                   ▼
//!           cancelled           cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. The transitions themselves live in
//! [`crate::lifecycle`]; this module only describes the data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Location, RideId, UserId};

/// Lifecycle status of a ride.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// Requested, visible to drivers
    Waiting,
    /// A driver has been assigned
    Accepted,
    /// The rider has been picked up
    InProgress,
    /// Terminal: trip finished
    Completed,
    /// Terminal: abandoned before pickup
    Cancelled,
}

impl RideStatus {
    /// Statuses that count towards the one-active-ride-per-user rule.
    pub const ACTIVE: [Self; 3] = [Self::Waiting, Self::Accepted, Self::InProgress];

    /// Whether the ride still occupies its rider and driver
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Waiting | Self::Accepted | Self::InProgress)
    }

    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a driver must be assigned in this status
    #[must_use]
    pub const fn requires_driver(self) -> bool {
        matches!(self, Self::Accepted | Self::InProgress | Self::Completed)
    }

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Solo or shared ride.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideKind {
    /// Private ride
    #[default]
    Solo,
    /// Shared with other riders going the same way
    Pool,
}

/// Payment state. Payment processing itself happens elsewhere.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Not yet paid
    #[default]
    Pending,
    /// Paid
    Completed,
    /// Payment attempt failed
    Failed,
}

/// Pool grouping for shared rides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolLink {
    /// Group identifier shared by every ride in the pool
    pub group_id: String,
    /// Riders sharing the vehicle
    pub passengers: Vec<UserId>,
}

/// A ride request and everything that happens to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    /// Identifier
    pub id: RideId,
    /// Rider who requested the ride
    pub rider_id: UserId,
    /// Assigned driver; set iff status is accepted, in progress or completed
    pub driver_id: Option<UserId>,
    /// Pickup point
    pub pickup: Location,
    /// Drop-off point
    pub drop: Location,
    /// Solo or pool
    pub kind: RideKind,
    /// Current lifecycle status
    pub status: RideStatus,
    /// Fare fixed at creation
    pub fare: f64,
    /// Estimated duration in minutes
    pub estimated_duration: Option<u32>,
    /// Actual duration in minutes, set on completion
    pub actual_duration: Option<u32>,
    /// Distance in kilometres
    pub distance: Option<f64>,
    /// Pool grouping
    pub pool: Option<PoolLink>,
    /// Payment state
    pub payment_status: PaymentStatus,
    /// Post-ride rating, 1 to 5
    pub rating: Option<u8>,
    /// Post-ride feedback
    pub feedback: Option<String>,
    /// When the ride was requested
    pub created_at: DateTime<Utc>,
    /// When a driver accepted
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the rider was picked up
    pub started_at: Option<DateTime<Utc>>,
    /// When the ride completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Ride {
    /// Whether `user` is the rider or the assigned driver
    #[must_use]
    pub fn involves(&self, user: &UserId) -> bool {
        &self.rider_id == user || self.driver_id.as_ref() == Some(user)
    }

    /// Users to notify about a change: the rider, then the driver if any.
    pub fn parties(&self) -> impl Iterator<Item = &UserId> {
        std::iter::once(&self.rider_id).chain(self.driver_id.iter())
    }

    /// Minutes between request and acceptance, if accepted
    #[must_use]
    pub fn wait_minutes(&self) -> Option<f64> {
        self.accepted_at.map(|accepted| {
            #[allow(clippy::cast_precision_loss)] // Sub-second precision is irrelevant here
            let seconds = (accepted - self.created_at).num_seconds().max(0) as f64;
            seconds / 60.0
        })
    }

    /// Whether the driver reference agrees with the status.
    #[must_use]
    pub const fn driver_matches_status(&self) -> bool {
        self.driver_id.is_some() == self.status.requires_driver()
    }
}

/// Rider-supplied details for a new ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideRequest {
    /// Rider asking for the ride
    pub rider_id: UserId,
    /// Pickup point
    pub pickup: Option<Location>,
    /// Drop-off point
    pub drop: Option<Location>,
    /// Solo or pool
    #[serde(default)]
    pub kind: RideKind,
    /// Quoted fare
    pub fare: f64,
    /// Estimated duration in minutes
    pub estimated_duration: Option<u32>,
    /// Distance in kilometres
    pub distance: Option<f64>,
}
