//! Pool ride matcher.
//!
//! Pairs a new pool ride with every other waiting pool ride from a different rider.
//! There is no route optimisation: the score is fixed and the saving is a quarter of
//! the cheaper fare.

use std::sync::Arc;

use campus_rides_core::{
    Clock, EntityStore, PoolSuggestion, PoolSuggestionId, Ride, RideError, RideId, RideKind,
    RideStatus, round_cents,
};

use crate::retry::{RetryPolicy, retry_store};

/// Compatibility score given to every candidate pair.
pub const COMPATIBILITY_SCORE: f64 = 0.85;

/// Share of the cheaper fare saved by pooling.
pub const SAVINGS_RATE: f64 = 0.25;

/// Produces and lists pool suggestions.
pub struct PoolMatcher {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl PoolMatcher {
    /// Creates a new matcher
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            retry,
        }
    }

    /// Store suggestions pairing `ride` with compatible waiting pool rides.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn suggest(&self, ride: &Ride) -> Result<Vec<PoolSuggestion>, RideError> {
        if ride.kind != RideKind::Pool {
            return Ok(Vec::new());
        }

        let waiting =
            retry_store(&self.retry, || self.store.rides_with_status(RideStatus::Waiting)).await?;
        let mut suggestions = Vec::new();
        for candidate in waiting.iter().filter(|c| {
            c.kind == RideKind::Pool && c.id != ride.id && c.rider_id != ride.rider_id
        }) {
            let suggestion = PoolSuggestion {
                id: PoolSuggestionId::new(),
                ride_id: ride.id,
                suggested_ride_id: candidate.id,
                savings: round_cents(SAVINGS_RATE * ride.fare.min(candidate.fare)),
                compatibility_score: COMPATIBILITY_SCORE,
                created_at: self.clock.now(),
            };
            retry_store(&self.retry, || self.store.put_pool_suggestion(suggestion.clone())).await?;
            suggestions.push(suggestion);
        }

        tracing::debug!(ride_id = %ride.id, count = suggestions.len(), "Pool suggestions stored");
        Ok(suggestions)
    }

    /// Suggestions stored for `ride_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown ride.
    pub async fn list(&self, ride_id: RideId) -> Result<Vec<PoolSuggestion>, RideError> {
        if retry_store(&self.retry, || self.store.get_ride(ride_id)).await?.is_none() {
            return Err(RideError::not_found("Ride", ride_id));
        }
        retry_store(&self.retry, || self.store.pool_suggestions_for(ride_id)).await
    }
}
