//! # Campus Rides Runtime
//!
//! The stateful half of Campus Rides: everything that owns data, takes locks or talks to
//! live connections.
//!
//! ## Core Components
//!
//! - **Engine**: runs ride commands through the reducer under per-ride locks
//! - **Dispatcher**: offers new rides to online drivers
//! - **Event bus**: per-user live connections, targeted sends and broadcasts
//! - **Ledger**: the durable notification history
//! - **Analytics**: daily rollups and dashboard series
//!
//! [`Services`] wires them together around one [`EntityStore`]. Construct it once per
//! process (or once per test) and share it; there is no global state.
//!
//! ## Example
//!
//! ```ignore
//! use campus_rides_runtime::{Services, RuntimeSettings, memory::InMemoryStore};
//! use campus_rides_core::SystemClock;
//!
//! let services = Services::new(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(SystemClock),
//!     RuntimeSettings::default(),
//! );
//! let ride = services.engine.create(request).await?;
//! let ride = services.engine.accept(ride.id, &driver_id).await?;
//! ```

use std::sync::Arc;

use campus_rides_core::{Clock, EntityStore, RideEnvironment};

/// Daily rollups and dashboard series
pub mod analytics;

/// Live connection registry and event fan-out
pub mod bus;

/// Offers new rides to drivers
pub mod dispatcher;

/// Ride lifecycle commands
pub mod engine;

/// Notification history
pub mod ledger;

/// Per-key async locks
pub mod locks;

/// In-memory entity store
pub mod memory;

/// Prometheus metrics for observability
pub mod metrics;

/// Pool ride suggestions
pub mod pool;

/// Retry logic with exponential backoff
pub mod retry;

/// User profiles and driver availability
pub mod users;

use analytics::AnalyticsAggregator;
use bus::{DEFAULT_CONNECTION_BUFFER, EventBus};
use dispatcher::Dispatcher;
use engine::{EffectTargets, RideEngine};
use ledger::NotificationLedger;
use locks::KeyedLocks;
use pool::PoolMatcher;
use retry::RetryPolicy;
use users::UserService;

/// Tunables for [`Services`].
#[derive(Clone, Debug)]
pub struct RuntimeSettings {
    /// Frames queued per live connection before events are dropped
    pub connection_buffer: usize,
    /// Retry policy for store calls
    pub store_retry: RetryPolicy,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            store_retry: RetryPolicy::default(),
        }
    }
}

/// The process-scoped service graph.
#[derive(Clone)]
pub struct Services {
    /// Ride lifecycle engine
    pub engine: Arc<RideEngine>,
    /// User directory
    pub users: Arc<UserService>,
    /// Live event bus
    pub bus: Arc<EventBus>,
    /// Notification ledger
    pub ledger: Arc<NotificationLedger>,
    /// Analytics aggregator
    pub analytics: Arc<AnalyticsAggregator>,
    /// Pool matcher
    pub pool: Arc<PoolMatcher>,
}

impl Services {
    /// Build the service graph over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        settings: RuntimeSettings,
    ) -> Self {
        let retry = settings.store_retry;
        let bus = Arc::new(EventBus::new(settings.connection_buffer));
        let user_locks = Arc::new(KeyedLocks::new());

        let ledger = Arc::new(NotificationLedger::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&clock),
            retry.clone(),
        ));
        let analytics = Arc::new(AnalyticsAggregator::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            retry.clone(),
        ));
        let pool = Arc::new(PoolMatcher::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            retry.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            retry.clone(),
        ));
        let users = Arc::new(UserService::new(
            Arc::clone(&store),
            Arc::clone(&user_locks),
            Arc::clone(&ledger),
            Arc::clone(&analytics),
            Arc::clone(&bus),
            Arc::clone(&clock),
            retry.clone(),
        ));

        let engine = Arc::new(RideEngine::new(
            store,
            RideEnvironment::new(clock),
            user_locks,
            EffectTargets {
                dispatcher,
                pool: Arc::clone(&pool),
                ledger: Arc::clone(&ledger),
                bus: Arc::clone(&bus),
                analytics: Arc::clone(&analytics),
                users: Arc::clone(&users),
            },
            retry,
        ));

        Self {
            engine,
            users,
            bus,
            ledger,
            analytics,
            pool,
        }
    }
}
