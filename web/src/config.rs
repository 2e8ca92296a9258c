//! Configuration management for the server.
//!
//! Loads configuration from environment variables with sensible defaults. Unset
//! variables fall back to the defaults; set but unparsable ones are an error.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use campus_rides_runtime::RuntimeSettings;
use campus_rides_runtime::retry::RetryPolicy;

/// A variable was set to something unusable.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    /// Variable name
    pub key: &'static str,
    /// Offending value
    pub value: String,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// HTTP listener
    pub server: ServerConfig,
    /// Event bus
    pub bus: BusConfig,
    /// Reconnect policy of the event-channel client
    pub channel: ChannelConfig,
    /// Store retry policy
    pub store: StoreConfig,
    /// Load the demo users on start-up
    pub seed_demo_data: bool,
    /// Install the Prometheus recorder and serve `/metrics`
    pub metrics_enabled: bool,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

/// Event bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Events queued per live connection before new ones are dropped
    pub connection_buffer: usize,
}

/// Event-channel client reconnect configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Reconnect attempts before giving up
    pub max_reconnects: u32,
    /// Delay before the first reconnect
    pub initial_delay: Duration,
    /// Cap on the delay
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
}

/// Store retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Retries after the first failed call
    pub max_retries: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a variable that is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a variable that is set but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse(&lookup, "PORT", 5000)?,
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                shutdown_timeout: Duration::from_secs(parse(&lookup, "SHUTDOWN_TIMEOUT", 30)?),
            },
            bus: BusConfig {
                connection_buffer: parse(&lookup, "BUS_CONNECTION_BUFFER", 64)?,
            },
            channel: ChannelConfig {
                max_reconnects: parse(&lookup, "CHANNEL_MAX_RECONNECTS", 5)?,
                initial_delay: Duration::from_millis(parse(&lookup, "CHANNEL_INITIAL_DELAY_MS", 1000)?),
                max_delay: Duration::from_millis(parse(&lookup, "CHANNEL_MAX_DELAY_MS", 16_000)?),
                multiplier: 2.0,
            },
            store: StoreConfig {
                max_retries: parse(&lookup, "STORE_MAX_RETRIES", 3)?,
                retry_delay: Duration::from_millis(parse(&lookup, "STORE_RETRY_DELAY_MS", 25)?),
            },
            seed_demo_data: parse(&lookup, "SEED_DEMO_DATA", true)?,
            metrics_enabled: parse(&lookup, "METRICS_ENABLED", true)?,
        })
    }

    /// `host:port` to bind
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Settings for the service graph
    #[must_use]
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            connection_buffer: self.bus.connection_buffer,
            store_retry: RetryPolicy::builder()
                .max_retries(self.store.max_retries)
                .initial_delay(self.store.retry_delay)
                .build(),
        }
    }

    /// Reconnect schedule for the event-channel client
    #[must_use]
    pub fn channel_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.channel.max_reconnects)
            .initial_delay(self.channel.initial_delay)
            .max_delay(self.channel.max_delay)
            .multiplier(self.channel.multiplier)
            .build()
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError { key, value }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.bus.connection_buffer, 64);
        assert!(config.seed_demo_data);
        assert!(config.metrics_enabled);

        let policy = config.channel_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(16));
    }

    #[test]
    fn variables_override_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("SEED_DEMO_DATA", "false"),
            ("STORE_MAX_RETRIES", "1"),
        ]))
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.seed_demo_data);
        assert_eq!(config.runtime_settings().store_retry.max_retries, 1);
    }

    #[test]
    fn garbage_is_reported() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert_eq!(err.key, "PORT");
    }
}
