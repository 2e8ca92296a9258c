//! Notification ledger.
//!
//! Append-only, per-user history of lifecycle events. Entries are written only as side
//! effects of transitions (and of drivers coming online); clients can read them and
//! flip the read flag, nothing else. Each targeted entry is also pushed live as a
//! `notification` event, best-effort.

use std::sync::Arc;

use campus_rides_core::{
    Clock, EntityStore, Notification, NotificationDraft, NotificationId, RideError, RideEvent,
    UserId,
};

use crate::bus::EventBus;
use crate::retry::{RetryPolicy, retry_store};

/// Writes and reads ledger entries.
pub struct NotificationLedger {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl NotificationLedger {
    /// Creates a new ledger
    #[must_use]
    pub fn new(
        store: Arc<dyn EntityStore>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            retry,
        }
    }

    /// Stamp and append an entry, then push it to its recipient if they are live.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the append keeps failing.
    pub async fn record(&self, draft: NotificationDraft) -> Result<Notification, RideError> {
        let notification = draft.into_notification(NotificationId::new(), self.clock.now());

        retry_store(&self.retry, || self.store.append_notification(notification.clone())).await?;
        tracing::debug!(
            notification_id = %notification.id,
            kind = %notification.kind,
            user_id = ?notification.user_id,
            "Ledger entry written"
        );

        if let Some(user) = &notification.user_id {
            self.bus
                .send_to(user, &RideEvent::Notification(notification.clone()))
                .await;
        }
        Ok(notification)
    }

    /// Entries for `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::TransientStore`] if the store keeps failing.
    pub async fn list(&self, user: &UserId) -> Result<Vec<Notification>, RideError> {
        retry_store(&self.retry, || self.store.notifications_for(user)).await
    }

    /// Mark an entry read. Marking twice is harmless; entries never become unread.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] for an unknown id.
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification, RideError> {
        retry_store(&self.retry, || self.store.mark_notification_read(id))
            .await?
            .ok_or_else(|| RideError::not_found("Notification", id))
    }
}
