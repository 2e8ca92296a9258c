//! The ride state machine.
//!
//! [`RideReducer`] decides every transition on a single [`Ride`]. It performs no I/O:
//! it validates the action against the current status, mutates the ride, and returns
//! the side effects the runtime should carry out afterwards. Checks that need other
//! entities (does the rider already have an active ride? is the driver busy?) are made
//! by the engine before the reducer runs, under the same locks.
//!
//! A reducer call either returns `Ok` with the ride updated, or `Err` with the ride
//! untouched. All checks happen before the first write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

use crate::analytics::Completion;
use crate::environment::Clock;
use crate::error::RideError;
use crate::event::RideEvent;
use crate::notification::{NotificationDraft, NotificationKind};
use crate::reducer::Reducer;
use crate::ride::{PaymentStatus, Ride, RideKind, RideRequest, RideStatus};
use crate::types::{RideId, UserId};
use crate::user::{Role, User};

/// Effects produced by one transition.
pub type RideEffects = SmallVec<[RideEffect; 4]>;

/// Inputs to the ride state machine (everything after creation).
#[derive(Clone, Debug, PartialEq)]
pub enum RideAction {
    /// A driver takes a waiting ride
    Accept {
        /// Profile of the accepting driver
        driver: User,
    },
    /// The rider has been picked up
    Start,
    /// The trip is over
    Complete {
        /// Actual duration in minutes
        actual_duration: Option<u32>,
    },
    /// The rider or the assigned driver abandons the ride
    Cancel {
        /// Who is cancelling
        actor: UserId,
    },
    /// The rider rates a completed ride
    Rate {
        /// Stars, 1 to 5
        rating: u8,
        /// Free-text feedback
        feedback: Option<String>,
    },
    /// Edit fields that do not affect the status
    Amend(RideAmendment),
}

impl RideAction {
    /// Metric label for the action
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Start => "start",
            Self::Complete { .. } => "complete",
            Self::Cancel { .. } => "cancel",
            Self::Rate { .. } => "rate",
            Self::Amend(_) => "amend",
        }
    }
}

/// Non-status fields a ride patch may change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAmendment {
    /// New estimated duration
    pub estimated_duration: Option<u32>,
    /// New distance
    pub distance: Option<f64>,
    /// New actual duration
    pub actual_duration: Option<u32>,
    /// New payment state
    pub payment_status: Option<PaymentStatus>,
    /// New feedback text
    pub feedback: Option<String>,
}

impl RideAmendment {
    /// Whether the amendment changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.estimated_duration.is_none()
            && self.distance.is_none()
            && self.actual_duration.is_none()
            && self.payment_status.is_none()
            && self.feedback.is_none()
    }

    /// Whether it touches trip fields that freeze once the ride is terminal
    const fn touches_trip(&self) -> bool {
        self.estimated_duration.is_some() || self.distance.is_some() || self.actual_duration.is_some()
    }
}

/// Side effects requested by the state machine.
///
/// They run after the ride is stored and are best-effort: a failure is logged and
/// counted but never undoes the transition.
#[derive(Clone, Debug, PartialEq)]
pub enum RideEffect {
    /// Offer a new ride to every online driver
    Dispatch(Ride),
    /// Look for pool companions for a new pool ride
    SuggestPool(Ride),
    /// Append a ledger entry
    Notify(NotificationDraft),
    /// Push a live event to one user
    SendTo {
        /// Recipient
        user_id: UserId,
        /// Event
        event: RideEvent,
    },
    /// Fold a completion into today's analytics
    RecordCompletion(Completion),
    /// Count the ride for one party, paying them if they drove it
    CreditParty {
        /// Rider or driver
        user_id: UserId,
        /// Fare of the ride
        fare: f64,
    },
    /// Fold a rating into the driver's profile and today's analytics
    RecordRating {
        /// Driver who was rated
        driver_id: UserId,
        /// Stars
        rating: u8,
    },
}

/// Dependencies of the ride reducer.
#[derive(Clone)]
pub struct RideEnvironment {
    /// Time source for transition timestamps
    pub clock: Arc<dyn Clock>,
}

impl RideEnvironment {
    /// Creates a new environment
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl std::fmt::Debug for RideEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RideEnvironment").finish_non_exhaustive()
    }
}

/// The ride lifecycle state machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct RideReducer;

impl RideReducer {
    /// Build a new waiting ride from a rider's request.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] when pickup or drop is missing or malformed,
    /// or when the fare is not positive.
    pub fn create(
        &self,
        id: RideId,
        request: RideRequest,
        env: &RideEnvironment,
    ) -> Result<(Ride, RideEffects), RideError> {
        let pickup = request
            .pickup
            .ok_or_else(|| RideError::validation("pickup is required"))?;
        let drop = request
            .drop
            .ok_or_else(|| RideError::validation("drop is required"))?;
        pickup.validate("pickup")?;
        drop.validate("drop")?;

        if !request.fare.is_finite() || request.fare <= 0.0 {
            return Err(RideError::validation("fare must be positive"));
        }
        if request.distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
            return Err(RideError::validation("distance must not be negative"));
        }

        let ride = Ride {
            id,
            rider_id: request.rider_id,
            driver_id: None,
            pickup,
            drop,
            kind: request.kind,
            status: RideStatus::Waiting,
            fare: request.fare,
            estimated_duration: request.estimated_duration,
            actual_duration: None,
            distance: request.distance,
            pool: None,
            payment_status: PaymentStatus::Pending,
            rating: None,
            feedback: None,
            created_at: env.clock.now(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
        };

        let mut effects: RideEffects = smallvec![
            RideEffect::Dispatch(ride.clone()),
            RideEffect::Notify(NotificationDraft::to_user(
                ride.rider_id.clone(),
                NotificationKind::RideRequest,
                "Ride Requested",
                "Your ride request has been submitted. Searching for drivers...",
                json!({ "rideId": ride.id }),
            )),
        ];
        if ride.kind == RideKind::Pool {
            effects.push(RideEffect::SuggestPool(ride.clone()));
        }

        Ok((ride, effects))
    }

    fn accept(ride: &mut Ride, driver: User, now: DateTime<Utc>) -> Result<RideEffects, RideError> {
        if ride.status != RideStatus::Waiting {
            return Err(RideError::conflict(format!(
                "ride {} is no longer available ({})",
                ride.id, ride.status
            )));
        }
        if driver.role != Role::Driver {
            return Err(RideError::validation(format!(
                "user {} is not a driver",
                driver.id
            )));
        }
        if driver.id == ride.rider_id {
            return Err(RideError::validation("a rider cannot accept their own ride"));
        }

        ride.driver_id = Some(driver.id.clone());
        ride.status = RideStatus::Accepted;
        ride.accepted_at = Some(now);

        Ok(smallvec![
            RideEffect::Notify(NotificationDraft::to_user(
                ride.rider_id.clone(),
                NotificationKind::RideAccepted,
                "Driver Found!",
                format!("{} will pick you up shortly", driver.name),
                json!({ "rideId": ride.id, "driverId": driver.id }),
            )),
            RideEffect::SendTo {
                user_id: ride.rider_id.clone(),
                event: RideEvent::RideAccepted {
                    ride: ride.clone(),
                    driver,
                },
            },
        ])
    }

    fn start(ride: &mut Ride, now: DateTime<Utc>) -> Result<RideEffects, RideError> {
        if ride.status != RideStatus::Accepted {
            return Err(RideError::conflict(format!(
                "ride {} cannot start from {}",
                ride.id, ride.status
            )));
        }

        ride.status = RideStatus::InProgress;
        ride.started_at = Some(now);

        Ok(updated_to_parties(ride))
    }

    fn complete(
        ride: &mut Ride,
        actual_duration: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<RideEffects, RideError> {
        let driver_id = match (&ride.status, &ride.driver_id) {
            (RideStatus::Accepted | RideStatus::InProgress, Some(driver_id)) => driver_id.clone(),
            _ => {
                return Err(RideError::conflict(format!(
                    "ride {} cannot complete from {}",
                    ride.id, ride.status
                )));
            }
        };

        ride.status = RideStatus::Completed;
        ride.completed_at = Some(now);
        if actual_duration.is_some() {
            ride.actual_duration = actual_duration;
        }

        let data = json!({ "rideId": ride.id, "fare": ride.fare });
        let mut effects: RideEffects = smallvec![
            RideEffect::SendTo {
                user_id: ride.rider_id.clone(),
                event: RideEvent::RideCompleted(ride.clone()),
            },
            RideEffect::SendTo {
                user_id: driver_id.clone(),
                event: RideEvent::RideCompleted(ride.clone()),
            },
            RideEffect::Notify(NotificationDraft::to_user(
                ride.rider_id.clone(),
                NotificationKind::RideCompleted,
                "Ride Completed",
                format!("You have arrived. Fare: {:.2}", ride.fare),
                data.clone(),
            )),
            RideEffect::Notify(NotificationDraft::to_user(
                driver_id.clone(),
                NotificationKind::RideCompleted,
                "Ride Completed",
                format!("You earned {:.2} for this ride", ride.fare),
                data,
            )),
        ];
        effects.push(RideEffect::RecordCompletion(Completion {
            fare: ride.fare,
            wait_minutes: ride.wait_minutes(),
            kind: ride.kind,
            completed_at: now,
        }));
        // Each party is credited independently.
        for user_id in [driver_id, ride.rider_id.clone()] {
            effects.push(RideEffect::CreditParty {
                user_id,
                fare: ride.fare,
            });
        }
        Ok(effects)
    }

    fn cancel(ride: &mut Ride, actor: &UserId) -> Result<RideEffects, RideError> {
        match ride.status {
            RideStatus::Waiting => {
                if actor != &ride.rider_id {
                    return Err(RideError::validation(
                        "only the rider can cancel a waiting ride",
                    ));
                }
            }
            RideStatus::Accepted => {
                if !ride.involves(actor) {
                    return Err(RideError::validation(
                        "only the rider or the assigned driver can cancel this ride",
                    ));
                }
            }
            RideStatus::InProgress | RideStatus::Completed | RideStatus::Cancelled => {
                return Err(RideError::conflict(format!(
                    "ride {} cannot be cancelled from {}",
                    ride.id, ride.status
                )));
            }
        }

        let previous_driver = ride.driver_id.take();
        ride.status = RideStatus::Cancelled;

        let mut effects: RideEffects = smallvec![RideEffect::SendTo {
            user_id: ride.rider_id.clone(),
            event: RideEvent::RideUpdated(ride.clone()),
        }];
        if let Some(driver_id) = previous_driver {
            effects.push(RideEffect::SendTo {
                user_id: driver_id.clone(),
                event: RideEvent::RideUpdated(ride.clone()),
            });
            let other = if actor == &driver_id {
                ride.rider_id.clone()
            } else {
                driver_id
            };
            effects.push(RideEffect::Notify(NotificationDraft::to_user(
                other,
                NotificationKind::RideCancelled,
                "Ride Cancelled",
                format!("Ride {} was cancelled", ride.id),
                json!({ "rideId": ride.id, "cancelledBy": actor }),
            )));
        }
        Ok(effects)
    }

    fn rate(ride: &mut Ride, rating: u8, feedback: Option<String>) -> Result<RideEffects, RideError> {
        if !(1..=5).contains(&rating) {
            return Err(RideError::validation("rating must be between 1 and 5"));
        }
        if ride.status != RideStatus::Completed {
            return Err(RideError::conflict(format!(
                "ride {} can only be rated once completed ({})",
                ride.id, ride.status
            )));
        }
        if ride.rating.is_some() {
            return Err(RideError::conflict(format!("ride {} is already rated", ride.id)));
        }
        let Some(driver_id) = ride.driver_id.clone() else {
            return Err(RideError::conflict(format!("ride {} has no driver", ride.id)));
        };

        ride.rating = Some(rating);
        if feedback.is_some() {
            ride.feedback = feedback;
        }

        let mut effects = updated_to_parties(ride);
        effects.push(RideEffect::RecordRating { driver_id, rating });
        Ok(effects)
    }

    fn amend(ride: &mut Ride, amendment: RideAmendment) -> Result<RideEffects, RideError> {
        if amendment.touches_trip() && ride.status.is_terminal() {
            return Err(RideError::conflict(format!(
                "ride {} is {} and its trip details are frozen",
                ride.id, ride.status
            )));
        }
        if amendment.distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
            return Err(RideError::validation("distance must not be negative"));
        }

        if let Some(value) = amendment.estimated_duration {
            ride.estimated_duration = Some(value);
        }
        if let Some(value) = amendment.distance {
            ride.distance = Some(value);
        }
        if let Some(value) = amendment.actual_duration {
            ride.actual_duration = Some(value);
        }
        if let Some(value) = amendment.payment_status {
            ride.payment_status = value;
        }
        if let Some(value) = amendment.feedback {
            ride.feedback = Some(value);
        }

        Ok(updated_to_parties(ride))
    }
}

impl Reducer for RideReducer {
    type State = Ride;
    type Action = RideAction;
    type Environment = RideEnvironment;
    type Effect = RideEffect;

    fn reduce(
        &self,
        ride: &mut Ride,
        action: RideAction,
        env: &RideEnvironment,
    ) -> Result<RideEffects, RideError> {
        match action {
            RideAction::Accept { driver } => Self::accept(ride, driver, env.clock.now()),
            RideAction::Start => Self::start(ride, env.clock.now()),
            RideAction::Complete { actual_duration } => {
                Self::complete(ride, actual_duration, env.clock.now())
            }
            RideAction::Cancel { actor } => Self::cancel(ride, &actor),
            RideAction::Rate { rating, feedback } => Self::rate(ride, rating, feedback),
            RideAction::Amend(amendment) => Self::amend(ride, amendment),
        }
    }
}

fn updated_to_parties(ride: &Ride) -> RideEffects {
    ride.parties()
        .map(|user_id| RideEffect::SendTo {
            user_id: user_id.clone(),
            event: RideEvent::RideUpdated(ride.clone()),
        })
        .collect()
}
