//! Failure injection for the entity store.
//!
//! [`FlakyStore`] forwards to an inner store but can be told to fail the next `n`
//! calls with [`StoreError::Unavailable`], or to fail every notification append.
//! The first exercises retry and all-or-nothing behaviour; the second shows that a
//! lost side effect never undoes a transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use campus_rides_core::{
    DailyAnalytics, EntityStore, NaiveDate, Notification, NotificationId, PoolSuggestion, Ride,
    RideId, RideStatus, StoreError, StoreFuture, User, UserId,
};

/// An [`EntityStore`] that fails on demand.
pub struct FlakyStore {
    inner: Arc<dyn EntityStore>,
    pending_failures: AtomicU32,
    notifications_broken: AtomicBool,
    ride_writes: AtomicUsize,
}

impl FlakyStore {
    /// Wrap `inner`; healthy until told otherwise
    #[must_use]
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            pending_failures: AtomicU32::new(0),
            notifications_broken: AtomicBool::new(false),
            ride_writes: AtomicUsize::new(0),
        }
    }

    /// Fail the next `count` calls, whatever they are
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make every notification append fail (or recover)
    pub fn break_notifications(&self, broken: bool) {
        self.notifications_broken.store(broken, Ordering::SeqCst);
    }

    /// Successful `put_ride` calls so far
    #[must_use]
    pub fn ride_writes(&self) -> usize {
        self.ride_writes.load(Ordering::SeqCst)
    }

    fn trip(&self, operation: &str) -> Result<(), StoreError> {
        let tripped = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable(format!("injected failure in {operation}")))
        } else {
            Ok(())
        }
    }

    fn guarded<'a, T: Send + 'a>(
        &'a self,
        operation: &'static str,
        call: StoreFuture<'a, T>,
    ) -> StoreFuture<'a, T> {
        Box::pin(async move {
            self.trip(operation)?;
            call.await
        })
    }
}

impl EntityStore for FlakyStore {
    fn get_user(&self, id: &UserId) -> StoreFuture<'_, Option<User>> {
        self.guarded("get_user", self.inner.get_user(id))
    }

    fn put_user(&self, user: User) -> StoreFuture<'_, ()> {
        self.guarded("put_user", self.inner.put_user(user))
    }

    fn online_drivers(&self) -> StoreFuture<'_, Vec<User>> {
        self.guarded("online_drivers", self.inner.online_drivers())
    }

    fn get_ride(&self, id: RideId) -> StoreFuture<'_, Option<Ride>> {
        self.guarded("get_ride", self.inner.get_ride(id))
    }

    fn put_ride(&self, ride: Ride) -> StoreFuture<'_, ()> {
        let call = self.inner.put_ride(ride);
        Box::pin(async move {
            self.trip("put_ride")?;
            call.await?;
            self.ride_writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn active_ride_for(&self, user: &UserId) -> StoreFuture<'_, Option<Ride>> {
        self.guarded("active_ride_for", self.inner.active_ride_for(user))
    }

    fn rides_with_status(&self, status: RideStatus) -> StoreFuture<'_, Vec<Ride>> {
        self.guarded("rides_with_status", self.inner.rides_with_status(status))
    }

    fn rides_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Ride>> {
        self.guarded("rides_for_user", self.inner.rides_for_user(user))
    }

    fn append_notification(&self, notification: Notification) -> StoreFuture<'_, ()> {
        let call = self.inner.append_notification(notification);
        Box::pin(async move {
            if self.notifications_broken.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable(
                    "notification table is down".to_string(),
                ));
            }
            self.trip("append_notification")?;
            call.await
        })
    }

    fn notifications_for(&self, user: &UserId) -> StoreFuture<'_, Vec<Notification>> {
        self.guarded("notifications_for", self.inner.notifications_for(user))
    }

    fn mark_notification_read(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        self.guarded("mark_notification_read", self.inner.mark_notification_read(id))
    }

    fn put_pool_suggestion(&self, suggestion: PoolSuggestion) -> StoreFuture<'_, ()> {
        self.guarded("put_pool_suggestion", self.inner.put_pool_suggestion(suggestion))
    }

    fn pool_suggestions_for(&self, ride: RideId) -> StoreFuture<'_, Vec<PoolSuggestion>> {
        self.guarded("pool_suggestions_for", self.inner.pool_suggestions_for(ride))
    }

    fn get_analytics(&self, date: NaiveDate) -> StoreFuture<'_, Option<DailyAnalytics>> {
        self.guarded("get_analytics", self.inner.get_analytics(date))
    }

    fn put_analytics(&self, row: DailyAnalytics) -> StoreFuture<'_, ()> {
        self.guarded("put_analytics", self.inner.put_analytics(row))
    }
}
