//! Prometheus metrics for the ride engine and the event bus.
//!
//! Recording goes through the `metrics` facade, so it is a no-op until a recorder is
//! installed. The server installs the Prometheus recorder once at start-up with
//! [`install_recorder`] and renders the returned handle at `/metrics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use campus_rides_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(handle) = install_recorder()? {
//!     println!("{}", handle.render());
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe every metric and install the global Prometheus recorder.
///
/// Returns `None` when another recorder is already installed (tests, or a second call).
///
/// # Errors
///
/// Returns [`MetricsError`] when the exporter cannot be built or installed for any
/// other reason.
pub fn install_recorder() -> Result<Option<PrometheusHandle>, MetricsError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?;

    match builder.install_recorder() {
        Ok(handle) => {
            register_metrics();
            Ok(Some(handle))
        }
        Err(e) => {
            let err_msg = e.to_string();
            if err_msg.contains("already") {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(None)
            } else {
                Err(MetricsError::Install(err_msg))
            }
        }
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Ride lifecycle
    describe_counter!("rides_created_total", "Rides created");
    describe_counter!(
        "ride_transitions_total",
        "Successful ride transitions, labelled by target status"
    );
    describe_counter!(
        "ride_accept_conflicts_total",
        "Accept attempts that lost the race or hit a busy driver"
    );
    describe_histogram!(
        "ride_command_duration_seconds",
        "Time taken to decide and store a ride command"
    );
    describe_counter!(
        "side_effects_failed_total",
        "Best-effort side effects that failed after a transition"
    );

    // Event bus
    describe_gauge!("bus_connections", "Open live-event connections");
    describe_counter!(
        "bus_events_delivered_total",
        "Events queued on a live connection"
    );
    describe_counter!(
        "bus_events_dropped_total",
        "Events dropped because the connection was full or closed"
    );
}

/// Ride lifecycle metrics recorder.
pub struct RideMetrics;

impl RideMetrics {
    /// Record a created ride.
    pub fn record_created() {
        counter!("rides_created_total").increment(1);
    }

    /// Record a transition into `status`.
    pub fn record_transition(status: &'static str) {
        counter!("ride_transitions_total", "to" => status).increment(1);
    }

    /// Record a lost accept.
    pub fn record_accept_conflict() {
        counter!("ride_accept_conflicts_total").increment(1);
    }

    /// Record how long a command took.
    pub fn record_command(command: &'static str, duration: Duration) {
        histogram!("ride_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a failed side effect.
    pub fn record_side_effect_failure(effect: &'static str) {
        counter!("side_effects_failed_total", "effect" => effect).increment(1);
    }
}

/// Event bus metrics recorder.
pub struct BusMetrics;

impl BusMetrics {
    /// Record the number of open connections.
    #[allow(clippy::cast_precision_loss)] // Connection counts stay far below 2^52
    pub fn record_connections(open: usize) {
        gauge!("bus_connections").set(open as f64);
    }

    /// Record a delivered event.
    pub fn record_delivered() {
        counter!("bus_events_delivered_total").increment(1);
    }

    /// Record a dropped event.
    pub fn record_dropped() {
        counter!("bus_events_dropped_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent_and_renders_ride_metrics() {
        let first = install_recorder().unwrap();
        let second = install_recorder().unwrap();
        assert!(second.is_none());

        RideMetrics::record_created();
        RideMetrics::record_transition("accepted");
        BusMetrics::record_delivered();

        // Another test binary may own the recorder; only assert when this call won.
        if let Some(handle) = first {
            let rendered = handle.render();
            assert!(rendered.contains("rides_created_total"));
            assert!(rendered.contains("ride_transitions_total"));
        }
    }
}
