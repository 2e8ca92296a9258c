//! End-to-end ride flows through the service graph.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use std::sync::Arc;

use campus_rides_core::{
    EntityStore, NotificationKind, PaymentStatus, RideError, RideStatus, User, UserId,
};
use campus_rides_runtime::engine::RidePatch;
use campus_rides_runtime::memory::InMemoryStore;
use campus_rides_runtime::{RuntimeSettings, Services};
use campus_rides_testing::{FlakyStore, fixtures, test_clock};
use serde_json::Value;

async fn services_with(users: Vec<User>) -> (Services, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    for user in users {
        store.put_user(user).await.unwrap();
    }
    let services = Services::new(store.clone(), Arc::new(test_clock()), RuntimeSettings::default());
    (services, store)
}

async fn campus() -> (Services, Arc<InMemoryStore>) {
    services_with(vec![
        fixtures::rider("student-1"),
        fixtures::rider("student-2"),
        fixtures::driver("driver-1"),
        fixtures::driver("driver-2"),
    ])
    .await
}

fn id(value: &str) -> UserId {
    UserId::new(value)
}

#[tokio::test]
async fn created_ride_is_the_riders_active_ride() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let active = services.engine.active_for(&id("student-1")).await.unwrap().unwrap();
    assert_eq!(active.id, ride.id);
    assert_eq!(active.status, RideStatus::Waiting);
    assert!(active.driver_id.is_none());

    let available = services.engine.list_available().await.unwrap();
    assert_eq!(available.len(), 1);
}

#[tokio::test]
async fn a_rider_has_one_active_ride_at_a_time() {
    let (services, _) = campus().await;
    services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let err = services
        .engine
        .create(fixtures::ride_request("student-1", 30.0))
        .await
        .unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));
    assert_eq!(services.engine.list_available().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_exactly_one_winner() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let tasks: Vec<_> = ["driver-1", "driver-2"]
        .into_iter()
        .map(|driver| {
            let engine = Arc::clone(&services.engine);
            tokio::spawn(async move { engine.accept(ride.id, &id(driver)).await })
        })
        .collect();

    let mut winners = Vec::new();
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(ride) => winners.push(ride),
            Err(RideError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 1);

    let stored = services.engine.get(ride.id).await.unwrap();
    assert_eq!(stored.status, RideStatus::Accepted);
    assert_eq!(stored.driver_id, winners[0].driver_id);
}

#[tokio::test]
async fn completing_twice_counts_revenue_once() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    let driver_1 = id("driver-1");
    let driver_2 = id("driver-2");
    let (first, second) = tokio::join!(
        services.engine.accept(ride.id, &driver_1),
        services.engine.accept(ride.id, &driver_2),
    );
    assert!(first.is_ok() != second.is_ok());
    let before = services.analytics.today_snapshot().await.unwrap();

    let completed = services.engine.complete(ride.id, Some(15)).await.unwrap();
    assert_eq!(completed.status, RideStatus::Completed);
    assert_eq!(completed.actual_duration, Some(15));

    let after = services.analytics.today_snapshot().await.unwrap();
    assert_eq!(after.total_rides, before.total_rides + 1);
    assert!((after.total_revenue - before.total_revenue - 45.0).abs() < 1e-9);

    let err = services.engine.complete(ride.id, Some(15)).await.unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));
    let again = services.analytics.today_snapshot().await.unwrap();
    assert_eq!(again.total_rides, after.total_rides);
    assert!((again.total_revenue - after.total_revenue).abs() < 1e-9);

    let driver_id = completed.driver_id.unwrap();
    let driver = services.users.get(&driver_id).await.unwrap();
    assert!((driver.earnings - 45.0).abs() < 1e-9);
    assert_eq!(services.users.get(&id("student-1")).await.unwrap().total_rides, 1);
    assert!(services.engine.active_for(&driver_id).await.unwrap().is_none());
}

#[tokio::test]
async fn driver_is_paid_when_the_rider_has_no_profile() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("ghost-rider", 15.0))
        .await
        .unwrap();
    services.engine.accept(ride.id, &id("driver-1")).await.unwrap();

    let completed = services.engine.complete(ride.id, Some(15)).await.unwrap();
    assert_eq!(completed.status, RideStatus::Completed);

    let driver = services.users.get(&id("driver-1")).await.unwrap();
    assert_eq!(driver.total_rides, 1);
    assert!((driver.earnings - 15.0).abs() < 1e-9);
    assert!(matches!(
        services.users.get(&id("ghost-rider")).await,
        Err(RideError::NotFound { .. })
    ));
}

#[tokio::test]
async fn cancelled_ride_cannot_be_accepted_late() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let cancelled = services.engine.cancel(ride.id, id("student-1")).await.unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert!(services.engine.active_for(&id("student-1")).await.unwrap().is_none());

    let err = services.engine.accept(ride.id, &id("driver-1")).await.unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));
}

#[tokio::test]
async fn offline_rider_still_finds_the_ledger_entry() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    assert!(!services.bus.is_online(&id("student-1")).await);

    services.engine.accept(ride.id, &id("driver-1")).await.unwrap();

    let entries = services.ledger.list(&id("student-1")).await.unwrap();
    assert_eq!(entries[0].kind, NotificationKind::RideAccepted);
    assert!(entries.iter().any(|n| n.kind == NotificationKind::RideRequest));

    let marked = services.ledger.mark_read(entries[0].id).await.unwrap();
    assert!(marked.is_read);
}

#[tokio::test]
async fn live_clients_get_requests_and_acceptances() {
    let (services, _) = campus().await;
    let (driver_conn, mut driver_rx) = services.bus.open().await;
    services.bus.associate(driver_conn, &id("driver-1")).await;
    let (rider_conn, mut rider_rx) = services.bus.open().await;
    services.bus.associate(rider_conn, &id("student-1")).await;

    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    let offer: Value = serde_json::from_str(&driver_rx.recv().await.unwrap()).unwrap();
    assert_eq!(offer["type"], "ride_request");
    assert_eq!(offer["userId"], "driver-1");

    services.engine.accept(ride.id, &id("driver-1")).await.unwrap();

    let mut types = Vec::new();
    while let Ok(frame) = rider_rx.try_recv() {
        let frame: Value = serde_json::from_str(&frame).unwrap();
        types.push(frame["type"].as_str().unwrap().to_string());
    }
    assert!(types.contains(&"ride_accepted".to_string()));
    assert!(types.contains(&"notification".to_string()));
}

#[tokio::test]
async fn busy_driver_cannot_take_a_second_ride() {
    let (services, _) = campus().await;
    let first = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    let second = services
        .engine
        .create(fixtures::ride_request("student-2", 30.0))
        .await
        .unwrap();

    services.engine.accept(first.id, &id("driver-1")).await.unwrap();
    let err = services.engine.accept(second.id, &id("driver-1")).await.unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));
    assert_eq!(
        services.engine.get(second.id).await.unwrap().status,
        RideStatus::Waiting
    );
}

#[tokio::test]
async fn rating_updates_driver_and_analytics() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    services.engine.accept(ride.id, &id("driver-1")).await.unwrap();
    services.engine.start(ride.id).await.unwrap();
    services.engine.complete(ride.id, None).await.unwrap();

    let rated = services
        .engine
        .rate(ride.id, 4, Some("Polite driver".to_string()))
        .await
        .unwrap();
    assert_eq!(rated.rating, Some(4));

    let driver = services.users.get(&id("driver-1")).await.unwrap();
    assert_eq!(driver.rating_count, 1);
    assert!((driver.rating - 4.0).abs() < 1e-9);
    let today = services.analytics.today_snapshot().await.unwrap();
    assert!((today.avg_rating - 4.0).abs() < 1e-9);

    let err = services.engine.rate(ride.id, 5, None).await.unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));
}

#[tokio::test]
async fn patches_go_through_the_state_machine() {
    let (services, _) = campus().await;
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();

    let err = services
        .engine
        .update(
            ride.id,
            RidePatch {
                status: Some(RideStatus::Completed),
                ..RidePatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));

    let accepted = services
        .engine
        .update(
            ride.id,
            RidePatch {
                status: Some(RideStatus::Accepted),
                driver_id: Some(id("driver-2")),
                estimated_duration: Some(20),
                ..RidePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(accepted.driver_id, Some(id("driver-2")));
    assert_eq!(accepted.estimated_duration, Some(20));

    let err = services
        .engine
        .update(
            ride.id,
            RidePatch {
                status: Some(RideStatus::Waiting),
                ..RidePatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RideError::Conflict(_)));

    let cancelled = services
        .engine
        .update(
            ride.id,
            RidePatch {
                status: Some(RideStatus::Cancelled),
                payment_status: Some(PaymentStatus::Failed),
                ..RidePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert!(cancelled.driver_id.is_none());
    assert_eq!(cancelled.payment_status, PaymentStatus::Failed);

    let entries = services.ledger.list(&id("driver-2")).await.unwrap();
    assert!(entries.iter().any(|n| n.kind == NotificationKind::RideCancelled));
}

#[tokio::test]
async fn pool_rides_from_different_riders_are_paired() {
    let (services, _) = campus().await;
    services
        .engine
        .create(fixtures::pool_request("student-1", 40.0))
        .await
        .unwrap();
    let second = services
        .engine
        .create(fixtures::pool_request("student-2", 60.0))
        .await
        .unwrap();

    let suggestions = services.pool.list(second.id).await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert!((suggestions[0].savings - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn transient_store_failures_are_retried_or_leave_nothing_behind() {
    let inner = Arc::new(InMemoryStore::new());
    inner.put_user(fixtures::rider("student-1")).await.unwrap();
    let flaky = Arc::new(FlakyStore::new(inner));
    let services = Services::new(flaky.clone(), Arc::new(test_clock()), RuntimeSettings::default());

    flaky.fail_next(2);
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    assert_eq!(flaky.ride_writes(), 1);
    services.engine.cancel(ride.id, id("student-1")).await.unwrap();

    flaky.fail_next(50);
    let err = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    flaky.fail_next(0);
    assert_eq!(flaky.ride_writes(), 2);
    assert!(services.engine.list_available().await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_notifications_never_undo_a_transition() {
    let inner = Arc::new(InMemoryStore::new());
    inner.put_user(fixtures::rider("student-1")).await.unwrap();
    inner.put_user(fixtures::driver("driver-1")).await.unwrap();
    let flaky = Arc::new(FlakyStore::new(inner));
    let services = Services::new(flaky.clone(), Arc::new(test_clock()), RuntimeSettings::default());

    flaky.break_notifications(true);
    let ride = services
        .engine
        .create(fixtures::ride_request("student-1", 45.0))
        .await
        .unwrap();
    let accepted = services.engine.accept(ride.id, &id("driver-1")).await.unwrap();

    assert_eq!(accepted.status, RideStatus::Accepted);
    assert!(services.ledger.list(&id("student-1")).await.unwrap().is_empty());
}
