//! Event fan-out bus.
//!
//! Maps each user to at most one live connection and pushes [`RideEvent`]s to one user
//! or to everyone. Delivery is fire-and-forget: an offline user, a full outbound queue
//! or a closed socket drops the event without an error. Clients treat events as hints
//! and re-fetch state from the HTTP surface after reconnecting.
//!
//! # Connection lifecycle
//!
//! ```text
//! open() ──> connection (anonymous) ──first message with userId──> associated
//!    │                                                                  │
//!    └───────────────────────────── close() <───────────────────────────┘
//! ```
//!
//! A user re-associating from a new connection replaces the old mapping. The reverse
//! index (connection → user) makes `close` O(1) and guarantees that closing the stale
//! connection later never removes the newer mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

use campus_rides_core::{Envelope, InboundMessage, RideEvent, UserId};

use crate::metrics::BusMetrics;

/// Default number of frames queued per connection before events are dropped.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Identifier of one live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of a targeted send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the recipient's connection
    Delivered,
    /// The recipient has no live connection
    Offline,
    /// The connection was full or closing; the event was discarded
    Dropped,
}

/// What the bus did with an inbound client frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Not JSON, or missing `type`
    Malformed,
    /// Parsed; nothing to act on beyond association
    Ignored,
    /// A driver position that was re-broadcast to this many connections
    Rebroadcast(usize),
}

struct Connection {
    sender: mpsc::Sender<String>,
    user: Option<UserId>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, ConnectionId>,
}

/// Process-scoped registry of live connections.
pub struct EventBus {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_BUFFER)
    }
}

impl EventBus {
    /// Creates a bus whose connections queue up to `buffer` frames each
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new, not yet associated connection.
    ///
    /// The returned receiver yields the JSON frames to write to the socket; it ends
    /// once the connection is closed.
    pub async fn open(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);

        let mut registry = self.registry.write().await;
        registry
            .connections
            .insert(id, Connection { sender, user: None });
        BusMetrics::record_connections(registry.connections.len());
        tracing::debug!(connection_id = %id, "Connection opened");

        (id, receiver)
    }

    /// Associate `connection` with `user`, replacing any previous mapping for either.
    pub async fn associate(&self, connection: ConnectionId, user: &UserId) {
        let mut registry = self.registry.write().await;
        let Registry {
            connections,
            by_user,
        } = &mut *registry;

        let Some(entry) = connections.get_mut(&connection) else {
            return;
        };
        if entry.user.as_ref() == Some(user) {
            return;
        }
        if let Some(previous_user) = entry.user.replace(user.clone()) {
            if by_user.get(&previous_user) == Some(&connection) {
                by_user.remove(&previous_user);
            }
        }

        if let Some(stale) = by_user
            .insert(user.clone(), connection)
            .and_then(|stale| connections.get_mut(&stale))
        {
            stale.user = None;
        }
        tracing::debug!(connection_id = %connection, user_id = %user, "Connection associated");
    }

    /// Forget `connection`; its user mapping is removed only if it still points here.
    pub async fn close(&self, connection: ConnectionId) {
        let mut registry = self.registry.write().await;
        if let Some(closed) = registry.connections.remove(&connection) {
            if let Some(user) = closed.user.filter(|user| registry.by_user.get(user) == Some(&connection)) {
                registry.by_user.remove(&user);
            }
            tracing::debug!(connection_id = %connection, "Connection closed");
        }
        BusMetrics::record_connections(registry.connections.len());
    }

    /// Whether `user` currently has a live connection
    pub async fn is_online(&self, user: &UserId) -> bool {
        self.registry.read().await.by_user.contains_key(user)
    }

    /// Number of open connections, associated or not
    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }

    /// Push `event` to `user` if they are connected.
    pub async fn send_to(&self, user: &UserId, event: &RideEvent) -> Delivery {
        let registry = self.registry.read().await;
        let Some(connection) = registry
            .by_user
            .get(user)
            .and_then(|id| registry.connections.get(id))
        else {
            tracing::trace!(user_id = %user, event_type = event.event_type(), "Recipient offline");
            return Delivery::Offline;
        };

        match Envelope::to_user(event, user).to_json() {
            Ok(frame) => push(&connection.sender, frame),
            Err(e) => {
                tracing::error!(error = %e, event_type = event.event_type(), "Failed to encode event");
                Delivery::Dropped
            }
        }
    }

    /// Push `event` to every associated connection; returns how many accepted it.
    pub async fn broadcast(&self, event: &RideEvent) -> usize {
        let frame = match Envelope::broadcast(event).to_json() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, event_type = event.event_type(), "Failed to encode event");
                return 0;
            }
        };

        let registry = self.registry.read().await;
        registry
            .by_user
            .values()
            .filter_map(|id| registry.connections.get(id))
            .filter(|connection| push(&connection.sender, frame.clone()) == Delivery::Delivered)
            .count()
    }

    /// Handle a text frame received on `connection`.
    ///
    /// Any message carrying a `userId` associates the connection. A well-formed
    /// `driver_location` is re-broadcast; every other type is ignored here.
    pub async fn handle_inbound(&self, connection: ConnectionId, text: &str) -> InboundOutcome {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(connection_id = %connection, error = %e, "Ignoring malformed message");
                return InboundOutcome::Malformed;
            }
        };

        if let Some(user) = &message.user_id {
            self.associate(connection, user).await;
        }

        match message.driver_location() {
            Some(location) => {
                let reached = self.broadcast(&RideEvent::DriverLocation(location)).await;
                InboundOutcome::Rebroadcast(reached)
            }
            None => {
                tracing::debug!(connection_id = %connection, kind = %message.kind, "Inbound message ignored");
                InboundOutcome::Ignored
            }
        }
    }
}

fn push(sender: &mpsc::Sender<String>, frame: String) -> Delivery {
    match sender.try_send(frame) {
        Ok(()) => {
            BusMetrics::record_delivered();
            Delivery::Delivered
        }
        Err(_) => {
            BusMetrics::record_dropped();
            Delivery::Dropped
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use campus_rides_core::{DriverLocation, Location};
    use serde_json::Value;

    fn location_event() -> RideEvent {
        RideEvent::DriverLocation(DriverLocation {
            driver_id: UserId::new("driver-1"),
            location: Location::new(12.97, 77.59, "Gate"),
        })
    }

    #[tokio::test]
    async fn send_to_offline_user_is_a_silent_no_op() {
        let bus = EventBus::default();
        let delivery = bus.send_to(&UserId::new("nobody"), &location_event()).await;
        assert_eq!(delivery, Delivery::Offline);
    }

    #[tokio::test]
    async fn association_is_lazy() {
        let bus = EventBus::default();
        let (conn, mut rx) = bus.open().await;
        let user = UserId::new("student-1");

        assert_eq!(bus.send_to(&user, &location_event()).await, Delivery::Offline);

        bus.handle_inbound(conn, r#"{"type":"hello","data":null,"userId":"student-1"}"#)
            .await;
        assert_eq!(bus.send_to(&user, &location_event()).await, Delivery::Delivered);

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "driver_location");
        assert_eq!(frame["userId"], "student-1");
    }

    #[tokio::test]
    async fn closing_a_stale_connection_keeps_the_new_mapping() {
        let bus = EventBus::default();
        let user = UserId::new("driver-1");
        let (old, _old_rx) = bus.open().await;
        let (new, mut new_rx) = bus.open().await;

        bus.associate(old, &user).await;
        bus.associate(new, &user).await;
        bus.close(old).await;

        assert!(bus.is_online(&user).await);
        assert_eq!(bus.send_to(&user, &location_event()).await, Delivery::Delivered);
        assert!(new_rx.recv().await.is_some());

        bus.close(new).await;
        assert!(!bus.is_online(&user).await);
        assert_eq!(bus.connection_count().await, 0);
    }

    #[tokio::test]
    async fn full_connection_drops_events() {
        let bus = EventBus::new(1);
        let user = UserId::new("student-1");
        let (conn, _rx) = bus.open().await;
        bus.associate(conn, &user).await;

        assert_eq!(bus.send_to(&user, &location_event()).await, Delivery::Delivered);
        assert_eq!(bus.send_to(&user, &location_event()).await, Delivery::Dropped);
    }

    #[tokio::test]
    async fn driver_location_is_rebroadcast_to_everyone() {
        let bus = EventBus::default();
        let (driver, _driver_rx) = bus.open().await;
        let (rider, mut rider_rx) = bus.open().await;
        bus.associate(rider, &UserId::new("student-1")).await;

        let outcome = bus
            .handle_inbound(
                driver,
                r#"{"type":"driver_location","userId":"driver-1","data":{"driverId":"driver-1","location":{"lat":12.9,"lng":77.6,"address":"Hostel"}}}"#,
            )
            .await;

        assert_eq!(outcome, InboundOutcome::Rebroadcast(2));
        let frame: Value = serde_json::from_str(&rider_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["data"]["location"]["address"], "Hostel");
        assert!(frame.get("userId").is_none());
    }

    #[tokio::test]
    async fn garbage_and_unknown_types_are_ignored() {
        let bus = EventBus::default();
        let (conn, _rx) = bus.open().await;
        assert_eq!(bus.handle_inbound(conn, "{not json").await, InboundOutcome::Malformed);
        assert_eq!(
            bus.handle_inbound(conn, r#"{"type":"ride_request","data":{}}"#).await,
            InboundOutcome::Ignored
        );
    }
}
