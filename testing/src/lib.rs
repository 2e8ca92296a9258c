//! # Campus Rides Testing
//!
//! Testing utilities and helpers for Campus Rides.
//!
//! This crate provides:
//! - Deterministic clocks
//! - Fixtures for users, locations and ride requests
//! - [`FlakyStore`], an [`EntityStore`](campus_rides_core::EntityStore) wrapper that
//!   injects transient failures
//! - [`ReducerTest`], a Given/When/Then harness for the ride state machine
//!
//! ## Example
//!
//! ```ignore
//! use campus_rides_testing::{fixtures, test_clock};
//! use campus_rides_runtime::{Services, RuntimeSettings, memory::InMemoryStore};
//!
//! #[tokio::test]
//! async fn rider_gets_a_waiting_ride() {
//!     let services = Services::new(
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(test_clock()),
//!         RuntimeSettings::default(),
//!     );
//!     let ride = services
//!         .engine
//!         .create(fixtures::ride_request("student-1", 45.0))
//!         .await
//!         .unwrap();
//!     assert_eq!(ride.status, RideStatus::Waiting);
//! }
//! ```

use chrono::{DateTime, Utc};
use campus_rides_core::environment::Clock;

/// Fixtures for users, locations and requests
pub mod fixtures;

/// Store wrapper that fails on demand
pub mod flaky_store;

/// Given/When/Then harness for reducers
pub mod reducer_test;

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use campus_rides_testing::mocks::FixedClock;
    /// use campus_rides_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// A clock that only moves when told to.
    ///
    /// Useful for durations such as the wait between request and acceptance.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant [`test_clock`] is frozen at.
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is a constant.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

// Re-export commonly used items
pub use flaky_store::FlakyStore;
pub use mocks::{FixedClock, ManualClock, test_clock, test_time};
pub use reducer_test::ReducerTest;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::new(test_time());
        assert_eq!(clock.now(), test_time());

        clock.advance(chrono::Duration::minutes(4));
        assert_eq!(clock.now(), test_time() + chrono::Duration::minutes(4));
    }
}
