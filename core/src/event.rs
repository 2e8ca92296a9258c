//! Live event channel messages.
//!
//! Outbound events are serialized as `{"type": ..., "data": ..., "userId"?: ...}`. Inbound
//! client messages share the shape but carry an arbitrary `type` and untyped `data`, so
//! they are parsed into [`InboundMessage`] first and only interpreted when the type is
//! one the bus acts on.

use serde::{Deserialize, Serialize};

use crate::notification::Notification;
use crate::ride::Ride;
use crate::types::{Location, UserId};
use crate::user::User;

/// Wire name of the driver location event.
pub const DRIVER_LOCATION: &str = "driver_location";

/// Payload of a `driver_location` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    /// Driver reporting the position
    pub driver_id: UserId,
    /// Current position
    pub location: Location,
}

/// Typed events pushed to live connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RideEvent {
    /// A new ride is waiting for a driver
    RideRequest(Ride),
    /// A driver took the rider's ride
    RideAccepted {
        /// Ride after acceptance
        ride: Ride,
        /// Driver profile
        driver: User,
    },
    /// The ride finished
    RideCompleted(Ride),
    /// Any other change to a ride (start, cancel, patch)
    RideUpdated(Ride),
    /// A driver moved
    DriverLocation(DriverLocation),
    /// A ledger entry was written for the recipient
    Notification(Notification),
}

impl RideEvent {
    /// Wire name of the event type
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RideRequest(_) => "ride_request",
            Self::RideAccepted { .. } => "ride_accepted",
            Self::RideCompleted(_) => "ride_completed",
            Self::RideUpdated(_) => "ride_updated",
            Self::DriverLocation(_) => DRIVER_LOCATION,
            Self::Notification(_) => "notification",
        }
    }
}

/// Outbound frame: the event plus the user it was addressed to, if any.
#[derive(Clone, Debug, Serialize)]
pub struct Envelope<'a> {
    /// Event type and payload
    #[serde(flatten)]
    pub event: &'a RideEvent,
    /// Recipient for targeted delivery
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<&'a UserId>,
}

impl<'a> Envelope<'a> {
    /// Frame for a targeted event
    #[must_use]
    pub const fn to_user(event: &'a RideEvent, user_id: &'a UserId) -> Self {
        Self {
            event,
            user_id: Some(user_id),
        }
    }

    /// Frame for a broadcast event
    #[must_use]
    pub const fn broadcast(event: &'a RideEvent) -> Self {
        Self {
            event,
            user_id: None,
        }
    }

    /// Serialize to the JSON text sent over the wire.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a payload cannot be encoded.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A message received from a client.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Message type
    #[serde(rename = "type")]
    pub kind: String,
    /// Untyped payload
    #[serde(default)]
    pub data: serde_json::Value,
    /// Sender identity, used to associate the connection
    #[serde(rename = "userId", default)]
    pub user_id: Option<UserId>,
}

impl InboundMessage {
    /// Parse a raw text frame
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed JSON or a missing `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The driver position carried by a well-formed `driver_location` message.
    #[must_use]
    pub fn driver_location(&self) -> Option<DriverLocation> {
        if self.kind != DRIVER_LOCATION {
            return None;
        }
        let payload: DriverLocation = serde_json::from_value(self.data.clone()).ok()?;
        payload.location.validate("location").ok()?;
        Some(payload)
    }
}
