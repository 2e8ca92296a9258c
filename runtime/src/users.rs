//! User directory: registration, profiles, driver availability and positions.
//!
//! Every read-modify-write of a profile holds that user's lock, the same
//! [`KeyedLocks`] the ride engine takes before a ride lock. Secondary effects of a
//! profile change (the `driver_online` ledger entry, the active-driver count, the
//! location broadcast) run after the lock is released and are best-effort.

use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use campus_rides_core::{
    Clock, DriverLocation, EntityStore, Location, NotificationDraft, NotificationKind, RideError,
    RideEvent, Role, User, UserId, VehicleInfo,
};

use crate::analytics::AnalyticsAggregator;
use crate::bus::EventBus;
use crate::ledger::NotificationLedger;
use crate::locks::KeyedLocks;
use crate::metrics::RideMetrics;
use crate::retry::{RetryPolicy, retry_store};

/// Registration payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Display name
    pub name: String,
    /// Role
    pub role: Role,
    /// Contact phone
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Vehicle, drivers only
    #[serde(default)]
    pub vehicle: Option<VehicleInfo>,
}

/// Profile fields a user may change.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    /// New display name
    pub name: Option<String>,
    /// New phone
    pub phone: Option<String>,
    /// New email
    pub email: Option<String>,
    /// New vehicle
    pub vehicle: Option<VehicleInfo>,
    /// New location
    pub location: Option<Location>,
}

/// Owns user profiles.
pub struct UserService {
    store: Arc<dyn EntityStore>,
    locks: Arc<KeyedLocks<UserId>>,
    ledger: Arc<NotificationLedger>,
    analytics: Arc<AnalyticsAggregator>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl UserService {
    /// Creates a new user service
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        locks: Arc<KeyedLocks<UserId>>,
        ledger: Arc<NotificationLedger>,
        analytics: Arc<AnalyticsAggregator>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            locks,
            ledger,
            analytics,
            bus,
            clock,
            retry,
        }
    }

    /// Register a new, offline user with a generated id.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] for a blank name or a vehicle on a non-driver.
    pub async fn register(&self, new_user: NewUser) -> Result<User, RideError> {
        let mut user = User::new(UserId::generate(), new_user.name, new_user.role, self.clock.now());
        user.phone = new_user.phone;
        user.email = new_user.email;
        user.vehicle = new_user.vehicle;
        user.validate()?;

        retry_store(&self.retry, || self.store.put_user(user.clone())).await?;
        tracing::info!(user_id = %user.id, role = ?user.role, "User registered");
        Ok(user)
    }

    /// Fetch a profile.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown id.
    pub async fn get(&self, id: &UserId) -> Result<User, RideError> {
        retry_store(&self.retry, || self.store.get_user(id))
            .await?
            .ok_or_else(|| RideError::not_found("User", id))
    }

    async fn modify<F>(&self, id: &UserId, change: F) -> Result<(User, User), RideError>
    where
        F: FnOnce(&mut User) -> Result<(), RideError>,
    {
        let _guard = self.locks.lock(id).await;
        let before = self.get(id).await?;
        let mut after = before.clone();
        change(&mut after)?;
        retry_store(&self.retry, || self.store.put_user(after.clone())).await?;
        Ok((before, after))
    }

    /// Apply a profile patch.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown id and [`RideError::Validation`]
    /// when the patched profile is invalid.
    pub async fn update(&self, id: &UserId, patch: UserPatch) -> Result<User, RideError> {
        let (_, user) = self
            .modify(id, |user| {
                if let Some(name) = patch.name {
                    user.name = name;
                }
                if let Some(phone) = patch.phone {
                    user.phone = Some(phone);
                }
                if let Some(email) = patch.email {
                    user.email = Some(email);
                }
                if let Some(vehicle) = patch.vehicle {
                    user.vehicle = Some(vehicle);
                }
                if let Some(location) = patch.location {
                    user.location = Some(location);
                }
                user.validate()
            })
            .await?;
        tracing::debug!(user_id = %user.id, "User updated");
        Ok(user)
    }

    /// Flip a user's online flag.
    ///
    /// A driver going from offline to online writes a `driver_online` entry for
    /// everyone. Any driver availability change refreshes today's active-driver count.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown id.
    pub async fn set_availability(&self, id: &UserId, online: bool) -> Result<User, RideError> {
        let (before, user) = self
            .modify(id, |user| {
                user.is_online = online;
                Ok(())
            })
            .await?;
        tracing::info!(user_id = %user.id, online, "Availability changed");

        if !user.is_driver() {
            return Ok(user);
        }
        if online && !before.is_online {
            let draft = NotificationDraft::to_everyone(
                NotificationKind::DriverOnline,
                "Driver Available",
                format!("{} is now online", user.name),
                json!({ "driverId": user.id }),
            );
            if let Err(error) = self.ledger.record(draft).await {
                side_effect_failed("driver_online", &error);
            }
        }
        if let Err(error) = self.refresh_active_drivers().await {
            side_effect_failed("active_drivers", &error);
        }
        Ok(user)
    }

    async fn refresh_active_drivers(&self) -> Result<(), RideError> {
        let online = self.online_drivers().await?;
        let count = u32::try_from(online.len()).unwrap_or(u32::MAX);
        self.analytics.set_active_drivers(count).await?;
        Ok(())
    }

    /// Drivers currently online.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn online_drivers(&self) -> Result<Vec<User>, RideError> {
        retry_store(&self.retry, || self.store.online_drivers()).await
    }

    /// Store a driver's position and broadcast it to every live client.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] for out-of-range coordinates or a non-driver,
    /// and [`RideError::NotFound`] for an unknown id.
    pub async fn update_driver_location(
        &self,
        id: &UserId,
        location: Location,
    ) -> Result<User, RideError> {
        location.validate("location")?;
        let (_, driver) = self
            .modify(id, |user| {
                if !user.is_driver() {
                    return Err(RideError::validation(format!("user {} is not a driver", user.id)));
                }
                user.location = Some(location.clone());
                Ok(())
            })
            .await?;

        let reached = self
            .bus
            .broadcast(&RideEvent::DriverLocation(DriverLocation {
                driver_id: driver.id.clone(),
                location,
            }))
            .await;
        tracing::debug!(driver_id = %driver.id, reached, "Driver location broadcast");
        Ok(driver)
    }

    /// Count a completed ride for one party, crediting the fare to drivers.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] if the user has no profile.
    pub async fn credit_completion(&self, user_id: &UserId, fare: f64) -> Result<User, RideError> {
        let (_, user) = self
            .modify(user_id, |user| {
                user.record_completed_ride(fare);
                Ok(())
            })
            .await?;
        Ok(user)
    }

    /// Fold a rating into the driver's running average.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] if the driver no longer exists.
    pub async fn record_rating(&self, driver_id: &UserId, rating: u8) -> Result<User, RideError> {
        let (_, driver) = self
            .modify(driver_id, |user| {
                user.record_rating(rating);
                Ok(())
            })
            .await?;
        Ok(driver)
    }

    /// Load the demo accounts if they are not there yet; returns the ones written.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn seed_demo(&self) -> Result<Vec<User>, RideError> {
        let mut written = Vec::new();
        for user in demo_users(self.clock.now()) {
            let _guard = self.locks.lock(&user.id).await;
            if retry_store(&self.retry, || self.store.get_user(&user.id)).await?.is_some() {
                continue;
            }
            retry_store(&self.retry, || self.store.put_user(user.clone())).await?;
            written.push(user);
        }
        if !written.is_empty() {
            tracing::info!(count = written.len(), "Demo users seeded");
            if let Err(error) = self.refresh_active_drivers().await {
                side_effect_failed("active_drivers", &error);
            }
        }
        Ok(written)
    }
}

fn side_effect_failed(effect: &'static str, error: &RideError) {
    tracing::warn!(effect, error = %error, "Side effect failed");
    RideMetrics::record_side_effect_failure(effect);
}

fn demo_users(now: campus_rides_core::DateTime<campus_rides_core::Utc>) -> Vec<User> {
    let mut student = User::new(UserId::new("student-1"), "Priya Sharma", Role::Student, now);
    student.phone = Some("+91 9876543210".to_string());
    student.email = Some("priya@mbu.edu".to_string());
    student.location = Some(Location::new(12.9716, 77.5946, "MBU Main Gate"));

    let mut driver = User::new(UserId::new("driver-1"), "Suresh Kumar", Role::Driver, now)
        .with_vehicle(VehicleInfo {
            make: "Maruti".to_string(),
            model: "Swift".to_string(),
            plate_number: "KA 01 AB 1234".to_string(),
            color: "White".to_string(),
        });
    driver.phone = Some("+91 9876543211".to_string());
    driver.email = Some("suresh@mbu.transport".to_string());
    driver.location = Some(Location::new(12.9720, 77.5950, "Near MBU Main Gate"));

    let mut admin = User::new(UserId::new("admin-1"), "Transport Admin", Role::Admin, now);
    admin.phone = Some("+91 9876543212".to_string());
    admin.email = Some("admin@mbu.transport".to_string());

    let mut users = vec![student, driver, admin];
    for user in &mut users {
        user.is_online = true;
    }
    users
}
