//! The entity store contract.
//!
//! The store is plain keyed storage: it owns no behaviour beyond CRUD and the simple
//! filters below. Each call is atomic for the entity it touches. Serialising
//! read-check-write sequences across calls is the caller's job (see the runtime's
//! keyed locks).
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] instead of using `async fn` so the store can be shared
//! as `Arc<dyn EntityStore>` between the engine, the ledger and the HTTP handlers.
//! Borrowed arguments are not captured by the returned future; implementations clone
//! what they need before boxing.

use chrono::NaiveDate;
use std::future::Future;
use std::pin::Pin;

use crate::analytics::{DailyAnalytics, PoolSuggestion};
use crate::error::StoreError;
use crate::notification::Notification;
use crate::ride::{Ride, RideStatus};
use crate::types::{NotificationId, RideId, UserId};
use crate::user::User;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable keyed storage for users, rides, notifications, pool suggestions and analytics.
pub trait EntityStore: Send + Sync {
    /// Fetch a user
    fn get_user(&self, id: &UserId) -> StoreFuture<'_, Option<User>>;

    /// Insert or replace a user
    fn put_user(&self, user: User) -> StoreFuture<'_, ()>;

    /// Drivers whose online flag is set
    fn online_drivers(&self) -> StoreFuture<'_, Vec<User>>;

    /// Fetch a ride
    fn get_ride(&self, id: RideId) -> StoreFuture<'_, Option<Ride>>;

    /// Insert or replace a ride.
    ///
    /// Implementations keep their active-ride index in step with the ride's status
    /// and parties.
    fn put_ride(&self, ride: Ride) -> StoreFuture<'_, ()>;

    /// The ride in which `user` is rider or driver and which is still active.
    fn active_ride_for(&self, user: &UserId) -> StoreFuture<'_, Option<Ride>>;

    /// Rides in `status`, newest first
    fn rides_with_status(&self, status: RideStatus) -> StoreFuture<'_, Vec<Ride>>;

    /// Rides where `user` is rider or driver, newest first
    fn rides_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Ride>>;

    /// Append a ledger entry
    fn append_notification(&self, notification: Notification) -> StoreFuture<'_, ()>;

    /// Ledger entries addressed to `user`, newest first
    fn notifications_for(&self, user: &UserId) -> StoreFuture<'_, Vec<Notification>>;

    /// Set the read flag; `None` when the entry does not exist
    fn mark_notification_read(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>>;

    /// Store a pool suggestion
    fn put_pool_suggestion(&self, suggestion: PoolSuggestion) -> StoreFuture<'_, ()>;

    /// Suggestions whose source is `ride`
    fn pool_suggestions_for(&self, ride: RideId) -> StoreFuture<'_, Vec<PoolSuggestion>>;

    /// The rollup for `date`
    fn get_analytics(&self, date: NaiveDate) -> StoreFuture<'_, Option<DailyAnalytics>>;

    /// Insert or replace the rollup for its date
    fn put_analytics(&self, row: DailyAnalytics) -> StoreFuture<'_, ()>;
}
