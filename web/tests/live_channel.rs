//! Live event channel over a real socket.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use std::sync::Arc;
use std::time::Duration;

use campus_rides_core::{EntityStore, UserId};
use campus_rides_runtime::memory::InMemoryStore;
use campus_rides_runtime::retry::RetryPolicy;
use campus_rides_runtime::{RuntimeSettings, Services};
use campus_rides_testing::{fixtures, test_clock};
use campus_rides_web::channel_client::{ChannelClient, ChannelEvent, ChannelHandle};
use campus_rides_web::{AppState, router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

async fn serve() -> (Services, String) {
    let store = Arc::new(InMemoryStore::new());
    for user in [fixtures::rider("student-1"), fixtures::driver("driver-1")] {
        store.put_user(user).await.unwrap();
    }
    let services = Services::new(store, Arc::new(test_clock()), RuntimeSettings::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let app = router(AppState::new(services.clone()));
    tokio::spawn(async move { axum::serve(listener, app).await });

    (services, url)
}

async fn wait_until_online(services: &Services, user: &str, online: bool) {
    let user = UserId::new(user);
    tokio::time::timeout(WAIT, async {
        while services.bus.is_online(&user).await != online {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{user} never became online={online}"));
}

/// Next frame of the given type, skipping everything else.
async fn next_frame_of(handle: &mut ChannelHandle, kind: &str) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match handle.next_event().await {
                Some(ChannelEvent::Frame(frame)) if frame["type"] == kind => return frame,
                Some(_) => {}
                None => panic!("client stopped while waiting for {kind}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind} frame"))
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(1)
        .initial_delay(Duration::from_millis(10))
        .build()
}

#[tokio::test]
async fn events_reach_the_parties_of_a_ride() {
    let (services, url) = serve().await;

    let (driver_socket, _) = connect_async(url.as_str()).await.unwrap();
    let (mut driver_tx, mut driver_rx) = driver_socket.split();
    driver_tx
        .send(Message::Text(
            json!({ "type": "hello", "data": null, "userId": "driver-1" }).to_string(),
        ))
        .await
        .unwrap();

    let mut rider = ChannelClient::new(url.clone(), UserId::new("student-1"), fast_policy()).spawn();
    assert_eq!(
        tokio::time::timeout(WAIT, rider.next_event()).await.unwrap(),
        Some(ChannelEvent::Connected { attempt: 0 })
    );

    wait_until_online(&services, "driver-1", true).await;
    wait_until_online(&services, "student-1", true).await;

    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let offer = tokio::time::timeout(WAIT, async {
        loop {
            if let Some(Ok(Message::Text(text))) = driver_rx.next().await {
                let frame: Value = serde_json::from_str(&text).unwrap();
                if frame["type"] == "ride_request" {
                    return frame;
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(offer["data"]["id"], ride.id.to_string());
    assert_eq!(offer["userId"], "driver-1");

    services
        .engine
        .accept(ride.id, &UserId::new("driver-1"))
        .await
        .unwrap();

    let accepted = next_frame_of(&mut rider, "ride_accepted").await;
    assert_eq!(accepted["data"]["ride"]["status"], "accepted");
    assert_eq!(accepted["data"]["driver"]["id"], "driver-1");

    // A driver position from the socket is re-broadcast to everyone.
    driver_tx
        .send(Message::Text(
            json!({
                "type": "driver_location",
                "data": {
                    "driverId": "driver-1",
                    "location": { "lat": 12.97, "lng": 77.59, "address": "Main Gate" }
                },
                "userId": "driver-1"
            })
            .to_string(),
        ))
        .await
        .unwrap();
    let position = next_frame_of(&mut rider, "driver_location").await;
    assert_eq!(position["data"]["driverId"], "driver-1");

    driver_tx.send(Message::Close(None)).await.unwrap();
    wait_until_online(&services, "driver-1", false).await;

    rider.shutdown();
}

#[tokio::test]
async fn malformed_frames_do_not_drop_the_connection() {
    let (services, url) = serve().await;

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    socket.send(Message::Text("{not json".to_string())).await.unwrap();
    socket
        .send(Message::Text(
            json!({ "type": "typing", "userId": "student-1" }).to_string(),
        ))
        .await
        .unwrap();

    wait_until_online(&services, "student-1", true).await;
    assert_eq!(services.bus.connection_count().await, 1);
}
