//! Notification ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{NotificationId, UserId};

/// What a ledger entry is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A ride was requested
    RideRequest,
    /// A driver accepted a ride
    RideAccepted,
    /// A ride was completed
    RideCompleted,
    /// A ride was cancelled
    RideCancelled,
    /// A driver came online
    DriverOnline,
}

impl NotificationKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RideRequest => "ride_request",
            Self::RideAccepted => "ride_accepted",
            Self::RideCompleted => "ride_completed",
            Self::RideCancelled => "ride_cancelled",
            Self::DriverOnline => "driver_online",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger entry. Only `is_read` ever changes after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Identifier
    pub id: NotificationId,
    /// Recipient; `None` addresses everyone
    pub user_id: Option<UserId>,
    /// Type tag
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Structured payload (ride id, driver id, ...)
    pub data: serde_json::Value,
    /// Read acknowledgement
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Content of a ledger entry before it is stamped with an id and time.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationDraft {
    /// Recipient; `None` addresses everyone
    pub user_id: Option<UserId>,
    /// Type tag
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Body text
    pub message: String,
    /// Structured payload
    pub data: serde_json::Value,
}

impl NotificationDraft {
    /// Draft addressed to one user
    #[must_use]
    pub fn to_user(
        user_id: UserId,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            kind,
            title: title.into(),
            message: message.into(),
            data,
        }
    }

    /// Draft addressed to everyone
    #[must_use]
    pub fn to_everyone(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            user_id: None,
            kind,
            title: title.into(),
            message: message.into(),
            data,
        }
    }

    /// Stamp the draft into a ledger entry
    #[must_use]
    pub fn into_notification(self, id: NotificationId, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            data: self.data,
            is_read: false,
            created_at,
        }
    }
}
