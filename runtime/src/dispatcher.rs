//! Matching dispatcher.
//!
//! Offers every new waiting ride to every online driver. There is no scoring and no
//! radius filter. The dispatcher never touches ride state: deciding who wins an
//! accept is the engine's locked compare-and-transition.

use std::sync::Arc;

use campus_rides_core::{EntityStore, Ride, RideError, RideEvent, User};

use crate::bus::{Delivery, EventBus};
use crate::retry::{RetryPolicy, retry_store};

/// Publishes ride opportunities to eligible drivers.
pub struct Dispatcher {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
    retry: RetryPolicy,
}

impl Dispatcher {
    /// Creates a new dispatcher
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, bus: Arc<EventBus>, retry: RetryPolicy) -> Self {
        Self { store, bus, retry }
    }

    /// Drivers eligible for `ride`: online drivers other than its rider.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn eligible_drivers(&self, ride: &Ride) -> Result<Vec<User>, RideError> {
        let mut drivers = retry_store(&self.retry, || self.store.online_drivers()).await?;
        drivers.retain(|driver| driver.id != ride.rider_id);
        Ok(drivers)
    }

    /// Send a `ride_request` to each eligible driver; returns how many were live.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the driver lookup keeps failing.
    pub async fn dispatch(&self, ride: &Ride) -> Result<usize, RideError> {
        let drivers = self.eligible_drivers(ride).await?;
        let event = RideEvent::RideRequest(ride.clone());

        let mut delivered = 0;
        for driver in &drivers {
            if self.bus.send_to(&driver.id, &event).await == Delivery::Delivered {
                delivered += 1;
            }
        }

        tracing::info!(
            ride_id = %ride.id,
            eligible = drivers.len(),
            delivered,
            "Ride offered to online drivers"
        );
        Ok(delivered)
    }
}
