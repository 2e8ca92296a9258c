//! Application state for Axum handlers.

use campus_rides_runtime::Services;
use metrics_exporter_prometheus::PrometheusHandle;

/// State shared by every handler: the service graph and, when metrics are enabled,
/// the Prometheus handle rendered at `/metrics`.
///
/// Built once per process (or per test); cloning shares the same services.
#[derive(Clone)]
pub struct AppState {
    /// Ride engine, users, bus, ledger, analytics and pool matcher
    pub services: Services,
    /// Recorder handle, `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create application state without a metrics endpoint.
    #[must_use]
    pub const fn new(services: Services) -> Self {
        Self {
            services,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
