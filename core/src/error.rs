//! Error taxonomy for ride operations.
//!
//! Every fallible operation surfaces exactly one of four kinds so callers can decide
//! whether to fix their input, refresh and re-decide, or retry with backoff:
//!
//! | Kind             | Meaning                                   | Retry?                     |
//! |------------------|-------------------------------------------|----------------------------|
//! | `Validation`     | Malformed or missing input                | No, the caller must fix it |
//! | `Conflict`       | Lost a race or would break an invariant   | After re-fetching state    |
//! | `NotFound`       | Stale reference                           | Not without a refresh      |
//! | `TransientStore` | The entity store hiccupped                | Yes, with backoff          |

use thiserror::Error;

/// Errors returned by the entity store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or timed out
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be decoded
    #[error("Stored record is corrupted: {0}")]
    Corrupted(String),
}

/// Errors produced by the ride lifecycle, dispatcher, ledger and user operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RideError {
    /// Input was malformed or missing
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request lost a race or would violate an invariant
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity ("Ride", "User", ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The underlying store failed; nothing was written
    #[error("Transient store failure: {0}")]
    TransientStore(#[from] StoreError),
}

impl RideError {
    /// Shorthand for [`RideError::Validation`]
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`RideError::Conflict`]
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Shorthand for [`RideError::NotFound`]
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Machine-readable error kind used at the HTTP boundary.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::TransientStore(_) => "transient_store_error",
        }
    }

    /// Whether retrying the identical request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_strings() {
        assert_eq!(RideError::validation("x").kind(), "validation_error");
        assert_eq!(RideError::conflict("x").kind(), "conflict");
        assert_eq!(RideError::not_found("Ride", "r1").kind(), "not_found");
        assert_eq!(
            RideError::from(StoreError::Unavailable("down".into())).kind(),
            "transient_store_error"
        );
    }

    #[test]
    fn only_store_failures_are_retryable() {
        assert!(RideError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!RideError::conflict("ride already accepted").is_retryable());
        assert!(!RideError::validation("fare must be positive").is_retryable());
    }

    #[test]
    fn not_found_message_names_entity() {
        assert_eq!(
            RideError::not_found("Ride", "abc").to_string(),
            "Ride abc not found"
        );
    }
}
