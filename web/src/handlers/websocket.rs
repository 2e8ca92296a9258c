//! Live event channel over WebSocket.
//!
//! # Message Protocol
//!
//! **Server → Client:**
//! ```json
//! { "type": "ride_accepted", "data": { ... }, "userId": "student-1" }
//! ```
//!
//! **Client → Server:**
//! ```json
//! { "type": "driver_location", "data": { "driverId": "...", "location": { ... } }, "userId": "driver-1" }
//! ```
//!
//! A connection stays anonymous until its first message carrying a `userId`; from then
//! on targeted events for that user are written to it. Malformed frames are logged and
//! ignored, never answered.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use campus_rides_runtime::bus::EventBus;
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// `GET /ws`
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let bus = Arc::clone(&state.services.bus);
    ws.on_upgrade(move |socket| handle_socket(socket, bus))
}

/// Run one connection until either side goes away.
///
/// Spawns two concurrent tasks:
/// 1. **Sender**: writes the bus's queued frames to the socket
/// 2. **Receiver**: hands client frames to the bus
async fn handle_socket(socket: WebSocket, bus: Arc<EventBus>) {
    let (connection_id, mut outbound) = bus.open().await;
    info!(connection_id = %connection_id, "Live connection established");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        debug!(connection_id = %connection_id, "Send task terminated");
    });

    let inbound_bus = Arc::clone(&bus);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    inbound_bus.handle_inbound(connection_id, &text).await;
                }
                Message::Binary(_) => {
                    warn!(connection_id = %connection_id, "Ignoring binary frame");
                }
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(_) => break,
            }
        }
        debug!(connection_id = %connection_id, "Receive task terminated");
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    bus.close(connection_id).await;
    info!(connection_id = %connection_id, "Live connection closed");
}
