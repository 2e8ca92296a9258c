//! # Campus Rides Core
//!
//! Domain types and the ride state machine for Campus Rides.
//!
//! This crate is pure: no I/O, no async runtime, no global state. It provides:
//!
//! - **Entities**: [`User`], [`Ride`], [`Notification`], [`PoolSuggestion`], [`DailyAnalytics`]
//! - **Errors**: [`RideError`] with its four kinds, and [`StoreError`]
//! - **State machine**: [`RideReducer`], a pure function from `(Ride, RideAction)` to the
//!   updated ride and the [`RideEffect`]s the runtime must perform
//! - **Events**: the live channel envelope ([`RideEvent`], [`InboundMessage`])
//! - **Store contract**: [`EntityStore`], implemented by the runtime crate
//!
//! ## Example
//!
//! ```ignore
//! use campus_rides_core::*;
//!
//! let env = RideEnvironment::new(Arc::new(SystemClock));
//! let (mut ride, effects) = RideReducer.create(RideId::new(), request, &env)?;
//! let effects = RideReducer.reduce(&mut ride, RideAction::Accept { driver }, &env)?;
//! ```

pub mod analytics;
pub mod environment;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod notification;
pub mod ride;
pub mod store;
pub mod types;
pub mod user;

// Re-export commonly used types
pub use analytics::{Completion, DailyAnalytics, DemandSeries, PoolSuggestion, RevenueSeries};
pub use chrono::{DateTime, NaiveDate, Utc};
pub use environment::{Clock, SystemClock};
pub use error::{RideError, StoreError};
pub use event::{DriverLocation, Envelope, InboundMessage, RideEvent};
pub use lifecycle::{RideAction, RideAmendment, RideEffect, RideEffects, RideEnvironment, RideReducer};
pub use notification::{Notification, NotificationDraft, NotificationKind};
pub use reducer::Reducer;
pub use ride::{PaymentStatus, PoolLink, Ride, RideKind, RideRequest, RideStatus};
pub use smallvec::{SmallVec, smallvec};
pub use store::{EntityStore, StoreFuture};
pub use types::{Location, NotificationId, PoolSuggestionId, RideId, UserId, VehicleInfo, round_cents};
pub use user::{Role, User};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<Effects>`.
/// They contain all business logic and are deterministic and testable.
pub mod reducer {
    use smallvec::SmallVec;

    use crate::error::RideError;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for RideReducer {
    ///     type State = Ride;
    ///     type Action = RideAction;
    ///     type Environment = RideEnvironment;
    ///     type Effect = RideEffect;
    ///
    ///     fn reduce(&self, ride: &mut Ride, action: RideAction, env: &RideEnvironment)
    ///         -> Result<SmallVec<[RideEffect; 4]>, RideError> {
    ///         match action {
    ///             RideAction::Start => { /* ... */ }
    ///             _ => { /* ... */ }
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Side effects the reducer can request
        type Effect;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// # Errors
        ///
        /// Returns the rejection when the action is not allowed in the current state.
        /// The state is left untouched in that case.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<SmallVec<[Self::Effect; 4]>, RideError>;
    }
}
