//! HTTP and WebSocket surface for Campus Rides.
//!
//! Handlers are a thin shell around [`campus_rides_runtime::Services`]: they parse the
//! request, call one service operation and map the result to a response.
//!
//! # Request Flow
//!
//! 1. **Correlation id** attached by [`middleware::with_correlation`]
//! 2. **Extract** path, JSON body ([`ApiJson`]) and state
//! 3. **Call** the engine or a service; it decides, stores and fans out
//! 4. **Map** `Result<T, RideError>` through [`AppError`] to a status and JSON body
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(Services::new(store, clock, settings));
//! let app = campus_rides_web::router(state);
//! axum::serve(listener, app).await?;
//! ```

use axum::{
    Router,
    routing::{get, patch, post, put},
};
use tower_http::cors::CorsLayer;

pub mod channel_client;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

// Re-export key types for convenience
pub use config::Config;
pub use error::AppError;
pub use extractors::{ApiJson, CorrelationId, OptionalJson};
pub use middleware::{CORRELATION_ID_HEADER, with_correlation};
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    use handlers::{analytics, notifications, rides, users, websocket};

    let api = Router::new()
        .route("/users", post(users::register))
        .route("/users/:id", get(users::get).patch(users::update))
        .route("/users/:id/availability", put(users::set_availability))
        .route("/drivers/online", get(users::online_drivers))
        .route("/drivers/:id/location", post(users::update_location))
        .route("/rides", post(rides::create))
        .route("/rides/available", get(rides::available))
        .route("/rides/user/:id", get(rides::for_user))
        .route("/rides/active/:id", get(rides::active))
        .route("/rides/:id", get(rides::get).patch(rides::update))
        .route("/rides/:id/accept", post(rides::accept))
        .route("/rides/:id/start", post(rides::start))
        .route("/rides/:id/complete", post(rides::complete))
        .route("/rides/:id/cancel", post(rides::cancel))
        .route("/rides/:id/rating", post(rides::rate))
        .route("/rides/:id/pool-suggestions", get(rides::pool_suggestions))
        // Both routes name the segment `id`; the first one is a user id.
        .route("/notifications/:id", get(notifications::list))
        .route("/notifications/:id/read", patch(notifications::mark_read))
        .route("/analytics/today", get(analytics::today))
        .route("/analytics/demand-prediction", get(analytics::demand_prediction))
        .route("/analytics/revenue", get(analytics::revenue));

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/ws", get(websocket::handle))
        .nest("/api", api);

    with_correlation(app)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
