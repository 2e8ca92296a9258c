//! Reconnecting client for the live event channel.
//!
//! Connects to `/ws`, registers the user with a first frame carrying `userId`, and
//! forwards every server frame to the consumer. When the socket drops it reconnects
//! following a [`RetryPolicy`]: with the default configuration 5 attempts, 1 s doubling
//! to at most 16 s. A successful connection resets the count.
//!
//! Events are hints. On every [`ChannelEvent::Connected`] the consumer should re-fetch
//! its state over HTTP, since anything pushed while disconnected is lost.
//!
//! # Example
//!
//! ```ignore
//! let mut handle = ChannelClient::new(url, UserId::new("student-1"), config.channel_policy()).spawn();
//! while let Some(event) = handle.next_event().await {
//!     match event {
//!         ChannelEvent::Connected { .. } => refresh().await,
//!         ChannelEvent::Frame(frame) => apply(frame),
//!         ChannelEvent::Disconnected => {}
//!         ChannelEvent::GaveUp { .. } => break,
//!     }
//! }
//! ```

use campus_rides_core::UserId;
use campus_rides_runtime::retry::RetryPolicy;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Frame type the client sends to associate its connection.
pub const REGISTER: &str = "register";

/// What the client reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket is (re)connected and registered
    Connected {
        /// Reconnect attempts it took, 0 for a first try
        attempt: u32,
    },
    /// A JSON frame from the server
    Frame(Value),
    /// The socket closed; a reconnect follows unless attempts are exhausted
    Disconnected,
    /// Reconnect attempts are exhausted; the client has stopped
    GaveUp {
        /// Attempts made after the last successful connection
        attempts: u32,
    },
}

/// Configuration of one client.
#[derive(Debug, Clone)]
pub struct ChannelClient {
    url: String,
    user_id: UserId,
    policy: RetryPolicy,
}

/// Running client.
#[derive(Debug)]
pub struct ChannelHandle {
    events: mpsc::Receiver<ChannelEvent>,
    outbound: mpsc::Sender<String>,
    user_id: UserId,
    task: JoinHandle<()>,
}

impl ChannelClient {
    /// Client for `url` (e.g. `ws://localhost:5000/ws`) acting as `user_id`.
    #[must_use]
    pub fn new(url: impl Into<String>, user_id: UserId, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            user_id,
            policy,
        }
    }

    /// Start the connection loop on the current runtime.
    #[must_use]
    pub fn spawn(self) -> ChannelHandle {
        let (event_tx, events) = mpsc::channel(64);
        let (outbound, outbound_rx) = mpsc::channel(64);
        let user_id = self.user_id.clone();
        let task = tokio::spawn(self.run(event_tx, outbound_rx));
        ChannelHandle {
            events,
            outbound,
            user_id,
            task,
        }
    }

    async fn run(self, events: mpsc::Sender<ChannelEvent>, mut outbound: mpsc::Receiver<String>) {
        let mut failures: u32 = 0;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    let attempt = failures;
                    failures = 0;
                    let (mut sink, mut source) = stream.split();

                    let register = frame(REGISTER, &Value::Null, &self.user_id);
                    if sink.send(Message::Text(register)).await.is_err() {
                        tracing::warn!(user_id = %self.user_id, "Registration frame not sent");
                    } else {
                        tracing::info!(user_id = %self.user_id, attempt, "Event channel connected");
                        if events.send(ChannelEvent::Connected { attempt }).await.is_err() {
                            return;
                        }

                        loop {
                            tokio::select! {
                                incoming = source.next() => match incoming {
                                    Some(Ok(Message::Text(text))) => {
                                        match serde_json::from_str::<Value>(&text) {
                                            Ok(value) => {
                                                if events.send(ChannelEvent::Frame(value)).await.is_err() {
                                                    return;
                                                }
                                            }
                                            Err(e) => tracing::warn!(error = %e, "Ignoring malformed frame"),
                                        }
                                    }
                                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                queued = outbound.recv() => match queued {
                                    Some(text) => {
                                        if sink.send(Message::Text(text)).await.is_err() {
                                            break;
                                        }
                                    }
                                    // Every handle is gone; nobody is listening.
                                    None => return,
                                },
                            }
                        }
                    }

                    tracing::info!(user_id = %self.user_id, "Event channel disconnected");
                    if events.send(ChannelEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %self.user_id, error = %e, attempt = failures, "Event channel connect failed");
                }
            }

            if !self.policy.allows(failures) {
                tracing::error!(user_id = %self.user_id, attempts = failures, "Event channel gave up");
                let _ = events.send(ChannelEvent::GaveUp { attempts: failures }).await;
                return;
            }
            tokio::time::sleep(self.policy.delay_for_attempt(failures)).await;
            failures += 1;
        }
    }
}

impl ChannelHandle {
    /// Next event, `None` once the client has stopped.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Queue a `{type, data, userId}` frame for the server.
    ///
    /// Returns `false` once the client has stopped.
    pub async fn send(&self, kind: &str, data: &Value) -> bool {
        self.outbound
            .send(frame(kind, data, &self.user_id))
            .await
            .is_ok()
    }

    /// Stop the client.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

fn frame(kind: &str, data: &Value, user_id: &UserId) -> String {
    json!({ "type": kind, "data": data, "userId": user_id }).to_string()
}
