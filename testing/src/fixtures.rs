//! Ready-made users, places and requests.

use campus_rides_core::{Location, RideKind, RideRequest, Role, User, UserId, VehicleInfo};

use crate::mocks::test_time;

/// Main gate of the campus
#[must_use]
pub fn main_gate() -> Location {
    Location::new(12.9716, 77.5946, "MBU Main Gate")
}

/// Central library
#[must_use]
pub fn library() -> Location {
    Location::new(12.9752, 77.6010, "Central Library")
}

/// An online student
#[must_use]
pub fn rider(id: &str) -> User {
    let mut user = User::new(UserId::new(id), format!("Student {id}"), Role::Student, test_time());
    user.is_online = true;
    user
}

/// An online driver with a vehicle
#[must_use]
pub fn driver(id: &str) -> User {
    let mut user = User::new(UserId::new(id), format!("Driver {id}"), Role::Driver, test_time())
        .with_vehicle(VehicleInfo {
            make: "Maruti".to_string(),
            model: "Swift".to_string(),
            plate_number: format!("KA 01 {id}"),
            color: "White".to_string(),
        });
    user.is_online = true;
    user
}

/// An operations admin
#[must_use]
pub fn admin(id: &str) -> User {
    User::new(UserId::new(id), "Transport Admin", Role::Admin, test_time())
}

/// A solo request from the gate to the library
#[must_use]
pub fn ride_request(rider_id: &str, fare: f64) -> RideRequest {
    RideRequest {
        rider_id: UserId::new(rider_id),
        pickup: Some(main_gate()),
        drop: Some(library()),
        kind: RideKind::Solo,
        fare,
        estimated_duration: Some(12),
        distance: Some(3.4),
    }
}

/// The same request as a pool ride
#[must_use]
pub fn pool_request(rider_id: &str, fare: f64) -> RideRequest {
    RideRequest {
        kind: RideKind::Pool,
        ..ride_request(rider_id, fare)
    }
}
