//! In-memory [`EntityStore`].
//!
//! All tables sit behind one `RwLock`, so every call is atomic. The active-ride index
//! maps each user to the ride that currently occupies them and is maintained on every
//! `put_ride`, which keeps `active_ride_for` O(1).

use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use campus_rides_core::{
    DailyAnalytics, EntityStore, NaiveDate, Notification, NotificationId, PoolSuggestion, Ride,
    RideId, RideStatus, StoreFuture, User, UserId,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    rides: HashMap<RideId, Ride>,
    active_by_user: HashMap<UserId, RideId>,
    notifications: Vec<Notification>,
    pool_suggestions: Vec<PoolSuggestion>,
    analytics: BTreeMap<NaiveDate, DailyAnalytics>,
}

impl Tables {
    fn reindex(&mut self, previous: Option<&Ride>, ride: &Ride) {
        if let Some(previous) = previous {
            for user in previous.parties() {
                if self.active_by_user.get(user) == Some(&previous.id) {
                    self.active_by_user.remove(user);
                }
            }
        }
        if ride.status.is_active() {
            for user in ride.parties() {
                self.active_by_user.insert(user.clone(), ride.id);
            }
        }
    }
}

fn newest_first(mut rides: Vec<Ride>) -> Vec<Ride> {
    rides.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rides
}

/// Process-local store used by the server and by tests.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryStore {
    fn get_user(&self, id: &UserId) -> StoreFuture<'_, Option<User>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.tables.read().await.users.get(&id).cloned()) })
    }

    fn put_user(&self, user: User) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.users.insert(user.id.clone(), user);
            Ok(())
        })
    }

    fn online_drivers(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut drivers: Vec<User> = tables
                .users
                .values()
                .filter(|user| user.is_driver() && user.is_online)
                .cloned()
                .collect();
            drivers.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(drivers)
        })
    }

    fn get_ride(&self, id: RideId) -> StoreFuture<'_, Option<Ride>> {
        Box::pin(async move { Ok(self.tables.read().await.rides.get(&id).cloned()) })
    }

    fn put_ride(&self, ride: Ride) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let previous = tables.rides.remove(&ride.id);
            tables.reindex(previous.as_ref(), &ride);
            tables.rides.insert(ride.id, ride);
            Ok(())
        })
    }

    fn active_ride_for(&self, user: &UserId) -> StoreFuture<'_, Option<Ride>> {
        let user = user.clone();
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .active_by_user
                .get(&user)
                .and_then(|id| tables.rides.get(id))
                .filter(|ride| ride.status.is_active() && ride.involves(&user))
                .cloned())
        })
    }

    fn rides_with_status(&self, status: RideStatus) -> StoreFuture<'_, Vec<Ride>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(newest_first(
                tables
                    .rides
                    .values()
                    .filter(|ride| ride.status == status)
                    .cloned()
                    .collect(),
            ))
        })
    }

    fn rides_for_user(&self, user: &UserId) -> StoreFuture<'_, Vec<Ride>> {
        let user = user.clone();
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(newest_first(
                tables
                    .rides
                    .values()
                    .filter(|ride| ride.involves(&user))
                    .cloned()
                    .collect(),
            ))
        })
    }

    fn append_notification(&self, notification: Notification) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.notifications.push(notification);
            Ok(())
        })
    }

    fn notifications_for(&self, user: &UserId) -> StoreFuture<'_, Vec<Notification>> {
        let user = user.clone();
        Box::pin(async move {
            let tables = self.tables.read().await;
            // Appended in time order, so reversing gives newest first.
            Ok(tables
                .notifications
                .iter()
                .rev()
                .filter(|n| n.user_id.as_ref() == Some(&user))
                .cloned()
                .collect())
        })
    }

    fn mark_notification_read(&self, id: NotificationId) -> StoreFuture<'_, Option<Notification>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            Ok(tables
                .notifications
                .iter_mut()
                .find(|n| n.id == id)
                .map(|n| {
                    n.is_read = true;
                    n.clone()
                }))
        })
    }

    fn put_pool_suggestion(&self, suggestion: PoolSuggestion) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.pool_suggestions.push(suggestion);
            Ok(())
        })
    }

    fn pool_suggestions_for(&self, ride: RideId) -> StoreFuture<'_, Vec<PoolSuggestion>> {
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(tables
                .pool_suggestions
                .iter()
                .filter(|s| s.ride_id == ride)
                .cloned()
                .collect())
        })
    }

    fn get_analytics(&self, date: NaiveDate) -> StoreFuture<'_, Option<DailyAnalytics>> {
        Box::pin(async move { Ok(self.tables.read().await.analytics.get(&date).cloned()) })
    }

    fn put_analytics(&self, row: DailyAnalytics) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.tables.write().await.analytics.insert(row.date, row);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use campus_rides_core::{Location, PaymentStatus, RideKind, Utc};
    use chrono::{Duration, TimeZone};

    fn ride(rider: &str, minutes: i64) -> Ride {
        Ride {
            id: RideId::new(),
            rider_id: UserId::new(rider),
            driver_id: None,
            pickup: Location::new(12.97, 77.59, "Gate"),
            drop: Location::new(12.93, 77.62, "Library"),
            kind: RideKind::Solo,
            status: RideStatus::Waiting,
            fare: 40.0,
            estimated_duration: None,
            actual_duration: None,
            distance: None,
            pool: None,
            payment_status: PaymentStatus::Pending,
            rating: None,
            feedback: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes),
            accepted_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn active_index_follows_status_and_driver() {
        let store = InMemoryStore::new();
        let mut r = ride("student-1", 0);
        store.put_ride(r.clone()).await.unwrap();
        assert_eq!(store.active_ride_for(&UserId::new("student-1")).await.unwrap().map(|x| x.id), Some(r.id));

        r.status = RideStatus::Accepted;
        r.driver_id = Some(UserId::new("driver-1"));
        store.put_ride(r.clone()).await.unwrap();
        assert!(store.active_ride_for(&UserId::new("driver-1")).await.unwrap().is_some());

        r.status = RideStatus::Cancelled;
        r.driver_id = None;
        store.put_ride(r).await.unwrap();
        assert!(store.active_ride_for(&UserId::new("student-1")).await.unwrap().is_none());
        assert!(store.active_ride_for(&UserId::new("driver-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let store = InMemoryStore::new();
        let older = ride("a", 0);
        let newer = ride("b", 5);
        store.put_ride(older.clone()).await.unwrap();
        store.put_ride(newer.clone()).await.unwrap();

        let waiting = store.rides_with_status(RideStatus::Waiting).await.unwrap();
        assert_eq!(waiting.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
    }
}
