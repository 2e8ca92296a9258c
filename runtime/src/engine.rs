//! Ride lifecycle engine.
//!
//! The only writer of ride status. Every command follows the same shape:
//!
//! 1. take the locks (user before ride)
//! 2. load, run the [`RideReducer`] on a copy, make the cross-entity checks
//! 3. store the copy with a single `put_ride`
//! 4. release the locks
//! 5. run the effects, best-effort
//!
//! Step 3 is the commit point: a rejected or failed command leaves nothing behind.
//! Effects run after the locks are dropped because some of them (crediting the
//! parties) take user locks of their own, and taking those while holding a ride lock
//! would invert the lock order.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use campus_rides_core::{
    EntityStore, PaymentStatus, Reducer, Ride, RideAction, RideAmendment, RideEffect, RideEffects,
    RideEnvironment, RideError, RideEvent, RideId, RideReducer, RideRequest, RideStatus, User,
    UserId,
};

use crate::analytics::AnalyticsAggregator;
use crate::bus::EventBus;
use crate::dispatcher::Dispatcher;
use crate::ledger::NotificationLedger;
use crate::locks::KeyedLocks;
use crate::metrics::RideMetrics;
use crate::pool::PoolMatcher;
use crate::retry::{RetryPolicy, retry_store};
use crate::users::UserService;

/// Generic ride patch.
///
/// A `status` is routed through the matching lifecycle command, so a patch can never
/// move a ride somewhere the state machine would not.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RidePatch {
    /// Target status
    pub status: Option<RideStatus>,
    /// Accepting driver, required with `status: accepted`
    pub driver_id: Option<UserId>,
    /// Who cancels, with `status: cancelled`; defaults to the rider
    pub actor: Option<UserId>,
    /// Actual duration in minutes
    pub actual_duration: Option<u32>,
    /// Payment state
    pub payment_status: Option<PaymentStatus>,
    /// Stars, 1 to 5
    pub rating: Option<u8>,
    /// Feedback text
    pub feedback: Option<String>,
    /// Estimated duration in minutes
    pub estimated_duration: Option<u32>,
    /// Distance in kilometres
    pub distance: Option<f64>,
}

/// Collaborators the engine hands effects to.
pub struct EffectTargets {
    /// Offers new rides to drivers
    pub dispatcher: Arc<Dispatcher>,
    /// Suggests pool companions
    pub pool: Arc<PoolMatcher>,
    /// Writes ledger entries
    pub ledger: Arc<NotificationLedger>,
    /// Pushes live events
    pub bus: Arc<EventBus>,
    /// Daily rollups
    pub analytics: Arc<AnalyticsAggregator>,
    /// Profile counters
    pub users: Arc<UserService>,
}

/// Runs ride commands.
pub struct RideEngine {
    store: Arc<dyn EntityStore>,
    reducer: RideReducer,
    env: RideEnvironment,
    ride_locks: KeyedLocks<RideId>,
    user_locks: Arc<KeyedLocks<UserId>>,
    targets: EffectTargets,
    retry: RetryPolicy,
}

impl RideEngine {
    /// Creates a new engine
    ///
    /// `user_locks` must be the same map the [`UserService`] uses.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        env: RideEnvironment,
        user_locks: Arc<KeyedLocks<UserId>>,
        targets: EffectTargets,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            reducer: RideReducer,
            env,
            ride_locks: KeyedLocks::new(),
            user_locks,
            targets,
            retry,
        }
    }

    /// Request a new ride.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] for a malformed request and
    /// [`RideError::Conflict`] if the rider already has an active ride.
    pub async fn create(&self, request: RideRequest) -> Result<Ride, RideError> {
        let started = Instant::now();
        let rider_id = request.rider_id.clone();
        if rider_id.as_str().trim().is_empty() {
            return Err(RideError::validation("riderId is required"));
        }

        let (ride, effects) = {
            let _rider_guard = self.user_locks.lock(&rider_id).await;
            let (ride, effects) = self.reducer.create(RideId::new(), request, &self.env)?;

            if let Some(active) = self.active_for(&rider_id).await? {
                return Err(RideError::conflict(format!(
                    "rider {rider_id} already has an active ride {}",
                    active.id
                )));
            }
            retry_store(&self.retry, || self.store.put_ride(ride.clone())).await?;
            (ride, effects)
        };

        RideMetrics::record_created();
        RideMetrics::record_command("create", started.elapsed());
        tracing::info!(ride_id = %ride.id, rider_id = %rider_id, kind = ?ride.kind, fare = ride.fare, "Ride requested");

        self.run_effects(effects).await;
        Ok(ride)
    }

    /// Assign `driver_id` to a waiting ride. Of several concurrent accepts exactly one
    /// wins; the others see [`RideError::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown ride or driver,
    /// [`RideError::Conflict`] if the ride is no longer waiting or the driver is busy,
    /// and [`RideError::Validation`] if the user cannot drive this ride.
    pub async fn accept(&self, ride_id: RideId, driver_id: &UserId) -> Result<Ride, RideError> {
        self.commit("accept", ride_id, Some(driver_id), |ride, driver| {
            let driver = driver.ok_or_else(|| RideError::not_found("User", driver_id))?;
            self.reducer.reduce(ride, RideAction::Accept { driver }, &self.env)
        })
        .await
    }

    /// Pick-up: `accepted → in_progress`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] or [`RideError::Conflict`].
    pub async fn start(&self, ride_id: RideId) -> Result<Ride, RideError> {
        self.transition(ride_id, RideAction::Start).await
    }

    /// Finish the trip from `accepted` or `in_progress`. Not idempotent: a second call
    /// is a [`RideError::Conflict`] and records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] or [`RideError::Conflict`].
    pub async fn complete(
        &self,
        ride_id: RideId,
        actual_duration: Option<u32>,
    ) -> Result<Ride, RideError> {
        self.transition(ride_id, RideAction::Complete { actual_duration })
            .await
    }

    /// Abandon a waiting or accepted ride on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`], [`RideError::Conflict`] past pick-up, or
    /// [`RideError::Validation`] when `actor` is not a party.
    pub async fn cancel(&self, ride_id: RideId, actor: UserId) -> Result<Ride, RideError> {
        self.transition(ride_id, RideAction::Cancel { actor }).await
    }

    /// Rate a completed ride, once.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] outside 1..=5 and [`RideError::Conflict`] if the
    /// ride is not completed or is already rated.
    pub async fn rate(
        &self,
        ride_id: RideId,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<Ride, RideError> {
        self.transition(ride_id, RideAction::Rate { rating, feedback })
            .await
    }

    /// Apply a generic patch atomically: either every part applies or none does.
    ///
    /// # Errors
    ///
    /// Any error of the lifecycle command the patch routes to; moving a ride back to
    /// `waiting` is a [`RideError::Conflict`].
    pub async fn update(&self, ride_id: RideId, patch: RidePatch) -> Result<Ride, RideError> {
        let accepting = match (patch.status, &patch.driver_id) {
            (Some(RideStatus::Accepted), Some(driver_id)) => Some(driver_id.clone()),
            (Some(RideStatus::Accepted), None) => {
                return Err(RideError::validation("driverId is required to accept a ride"));
            }
            _ => None,
        };

        self.commit("update", ride_id, accepting.as_ref(), |ride, driver| {
            let before = ride.clone();
            let mut effects = RideEffects::new();

            if let Some(status) = patch.status.filter(|status| *status != ride.status) {
                let action = match status {
                    RideStatus::Waiting => {
                        return Err(RideError::conflict(format!(
                            "ride {} cannot return to waiting",
                            ride.id
                        )));
                    }
                    RideStatus::Accepted => RideAction::Accept {
                        driver: driver.ok_or_else(|| {
                            RideError::not_found("User", accepting.as_ref().map_or("", UserId::as_str))
                        })?,
                    },
                    RideStatus::InProgress => RideAction::Start,
                    RideStatus::Completed => RideAction::Complete {
                        actual_duration: patch.actual_duration,
                    },
                    RideStatus::Cancelled => RideAction::Cancel {
                        actor: patch.actor.clone().unwrap_or_else(|| ride.rider_id.clone()),
                    },
                };
                effects.extend(self.reducer.reduce(ride, action, &self.env)?);
            }

            let mut feedback = patch.feedback;
            if let Some(rating) = patch.rating {
                let action = RideAction::Rate {
                    rating,
                    feedback: feedback.take(),
                };
                effects.extend(self.reducer.reduce(ride, action, &self.env)?);
            }

            let amendment = RideAmendment {
                estimated_duration: patch.estimated_duration,
                distance: patch.distance,
                actual_duration: patch
                    .actual_duration
                    .filter(|_| patch.status != Some(RideStatus::Completed)),
                payment_status: patch.payment_status,
                feedback,
            };
            if !amendment.is_empty() {
                effects.extend(
                    self.reducer
                        .reduce(ride, RideAction::Amend(amendment), &self.env)?,
                );
            }

            Ok(with_single_update(effects, &before, ride))
        })
        .await
    }

    /// Fetch a ride.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown id.
    pub async fn get(&self, ride_id: RideId) -> Result<Ride, RideError> {
        retry_store(&self.retry, || self.store.get_ride(ride_id))
            .await?
            .ok_or_else(|| RideError::not_found("Ride", ride_id))
    }

    /// Waiting rides, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn list_available(&self) -> Result<Vec<Ride>, RideError> {
        retry_store(&self.retry, || self.store.rides_with_status(RideStatus::Waiting)).await
    }

    /// Rides where `user` is rider or driver, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn list_for_user(&self, user: &UserId) -> Result<Vec<Ride>, RideError> {
        retry_store(&self.retry, || self.store.rides_for_user(user)).await
    }

    /// The active ride occupying `user`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn active_for(&self, user: &UserId) -> Result<Option<Ride>, RideError> {
        retry_store(&self.retry, || self.store.active_ride_for(user)).await
    }

    async fn transition(&self, ride_id: RideId, action: RideAction) -> Result<Ride, RideError> {
        let command = action.name();
        self.commit(command, ride_id, None, |ride, _| {
            self.reducer.reduce(ride, action, &self.env)
        })
        .await
    }

    /// Lock, decide on a copy, check the driver is free, store, unlock, run effects.
    async fn commit<F>(
        &self,
        command: &'static str,
        ride_id: RideId,
        driver_id: Option<&UserId>,
        decide: F,
    ) -> Result<Ride, RideError>
    where
        F: FnOnce(&mut Ride, Option<User>) -> Result<RideEffects, RideError>,
    {
        let started = Instant::now();
        let result = self.commit_locked(ride_id, driver_id, decide).await;
        RideMetrics::record_command(command, started.elapsed());

        let (previous, ride, effects) = match result {
            Ok(committed) => committed,
            Err(error) => {
                if matches!(error, RideError::Conflict(_)) && driver_id.is_some() {
                    RideMetrics::record_accept_conflict();
                }
                tracing::debug!(ride_id = %ride_id, command, kind = error.kind(), error = %error, "Ride command rejected");
                return Err(error);
            }
        };

        if ride.status != previous {
            RideMetrics::record_transition(ride.status.as_str());
            tracing::info!(
                ride_id = %ride.id,
                command,
                from = %previous,
                to = %ride.status,
                driver_id = ?ride.driver_id,
                "Ride transitioned"
            );
        } else {
            tracing::debug!(ride_id = %ride.id, command, "Ride updated");
        }

        self.run_effects(effects).await;
        Ok(ride)
    }

    async fn commit_locked<F>(
        &self,
        ride_id: RideId,
        driver_id: Option<&UserId>,
        decide: F,
    ) -> Result<(RideStatus, Ride, RideEffects), RideError>
    where
        F: FnOnce(&mut Ride, Option<User>) -> Result<RideEffects, RideError>,
    {
        let _driver_guard = match driver_id {
            Some(id) => Some(self.user_locks.lock(id).await),
            None => None,
        };
        let driver = match driver_id {
            Some(id) => retry_store(&self.retry, || self.store.get_user(id)).await?,
            None => None,
        };

        let _ride_guard = self.ride_locks.lock(&ride_id).await;
        let current = self.get(ride_id).await?;
        let mut next = current.clone();
        let effects = decide(&mut next, driver)?;

        if current.status == RideStatus::Waiting && next.status == RideStatus::Accepted {
            if let Some(driver_id) = &next.driver_id {
                let busy = self
                    .active_for(driver_id)
                    .await?
                    .filter(|active| active.id != ride_id);
                if let Some(busy) = busy {
                    return Err(RideError::conflict(format!(
                        "driver {driver_id} already has an active ride {}",
                        busy.id
                    )));
                }
            }
        }

        retry_store(&self.retry, || self.store.put_ride(next.clone())).await?;
        Ok((current.status, next, effects))
    }

    async fn run_effects(&self, effects: RideEffects) {
        for effect in effects {
            let name = effect_name(&effect);
            if let Err(error) = self.run_effect(effect).await {
                tracing::warn!(effect = name, error = %error, "Side effect failed; transition stands");
                RideMetrics::record_side_effect_failure(name);
            }
        }
    }

    async fn run_effect(&self, effect: RideEffect) -> Result<(), RideError> {
        let targets = &self.targets;
        match effect {
            RideEffect::Dispatch(ride) => targets.dispatcher.dispatch(&ride).await.map(|_| ()),
            RideEffect::SuggestPool(ride) => targets.pool.suggest(&ride).await.map(|_| ()),
            RideEffect::Notify(draft) => targets.ledger.record(draft).await.map(|_| ()),
            RideEffect::SendTo { user_id, event } => {
                targets.bus.send_to(&user_id, &event).await;
                Ok(())
            }
            RideEffect::RecordCompletion(completion) => targets
                .analytics
                .record_completion(&completion)
                .await
                .map(|_| ()),
            RideEffect::CreditParty { user_id, fare } => {
                targets.users.credit_completion(&user_id, fare).await.map(|_| ())
            }
            RideEffect::RecordRating { driver_id, rating } => {
                targets.users.record_rating(&driver_id, rating).await?;
                targets.analytics.record_rating(rating).await.map(|_| ())
            }
        }
    }
}

const fn effect_name(effect: &RideEffect) -> &'static str {
    match effect {
        RideEffect::Dispatch(_) => "dispatch",
        RideEffect::SuggestPool(_) => "suggest_pool",
        RideEffect::Notify(_) => "notify",
        RideEffect::SendTo { .. } => "send_to",
        RideEffect::RecordCompletion(_) => "record_completion",
        RideEffect::CreditParty { .. } => "credit_party",
        RideEffect::RecordRating { .. } => "record_rating",
    }
}

/// Collapse the `ride_updated` pushes of a multi-step patch into one per party,
/// carrying the final ride. Parties of the ride before the patch (a driver who was
/// just cancelled on) are included.
fn with_single_update(effects: RideEffects, before: &Ride, after: &Ride) -> RideEffects {
    let mut effects: RideEffects = effects
        .into_iter()
        .filter(|effect| {
            !matches!(
                effect,
                RideEffect::SendTo {
                    event: RideEvent::RideUpdated(_),
                    ..
                }
            )
        })
        .collect();

    let mut recipients: Vec<&UserId> = before.parties().chain(after.parties()).collect();
    recipients.sort();
    recipients.dedup();
    for user_id in recipients {
        effects.push(RideEffect::SendTo {
            user_id: user_id.clone(),
            event: RideEvent::RideUpdated(after.clone()),
        });
    }
    effects
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn patch_updates_are_collapsed_per_party() {
        let ride: Ride = serde_json::from_value(serde_json::json!({
            "id": "7f1c1c4e-2b0a-4c55-9d2e-1e9f3a0b6c11",
            "riderId": "student-1",
            "driverId": "driver-1",
            "pickup": { "lat": 12.97, "lng": 77.59, "address": "Gate" },
            "drop": { "lat": 12.99, "lng": 77.61, "address": "Library" },
            "kind": "solo",
            "status": "accepted",
            "fare": 45.0,
            "estimatedDuration": null,
            "actualDuration": null,
            "distance": null,
            "pool": null,
            "paymentStatus": "pending",
            "rating": null,
            "feedback": null,
            "createdAt": "2025-01-01T00:00:00Z",
            "acceptedAt": "2025-01-01T00:02:00Z",
            "startedAt": null,
            "completedAt": null
        }))
        .unwrap();
        let mut cancelled = ride.clone();
        cancelled.status = RideStatus::Cancelled;
        cancelled.driver_id = None;

        let stale = RideEffect::SendTo {
            user_id: ride.rider_id.clone(),
            event: RideEvent::RideUpdated(ride.clone()),
        };
        let effects = with_single_update(campus_rides_core::smallvec![stale.clone(), stale], &ride, &cancelled);

        assert_eq!(effects.len(), 2);
        assert!(effects.iter().all(|effect| matches!(
            effect,
            RideEffect::SendTo { event: RideEvent::RideUpdated(r), .. } if r.status == RideStatus::Cancelled
        )));
    }
}
