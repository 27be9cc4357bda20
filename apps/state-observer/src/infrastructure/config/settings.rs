//! Observer Configuration Settings
//!
//! Loaded from environment variables. Call `dotenvy::dotenv()` first to pick
//! up a `.env` file.

use std::time::Duration;

use crate::domain::log_buffer::DEFAULT_LOG_CAPACITY;
use crate::domain::store::DEFAULT_ORDER_HISTORY_CAPACITY;

/// Default engine observer endpoint.
pub const DEFAULT_OBSERVER_URL: &str = "ws://127.0.0.1:8080/ws";

/// Default delay between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default silence after which the connection is considered dead.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default period of the state summary log line.
pub const DEFAULT_SUMMARY_INTERVAL: Duration = Duration::from_secs(30);

/// Observer client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Engine observer stream (`ws://` or `wss://`).
    pub url: String,
    /// Fixed delay before each reconnect.
    pub reconnect_delay: Duration,
    /// Read silence that forces a reconnect; `None` waits forever.
    pub heartbeat_timeout: Option<Duration>,
    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,
    /// System log ring size.
    pub log_capacity: usize,
    /// Terminal order history size.
    pub order_history_capacity: usize,
    /// Period of the state summary log line; `None` disables it.
    pub summary_interval: Option<Duration>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OBSERVER_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_timeout: Some(DEFAULT_HEARTBEAT_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            log_capacity: DEFAULT_LOG_CAPACITY,
            order_history_capacity: DEFAULT_ORDER_HISTORY_CAPACITY,
            summary_interval: Some(DEFAULT_SUMMARY_INTERVAL),
        }
    }
}

impl ObserverConfig {
    /// Config pointing at `url` with default timings.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `OBSERVER_URL` is not a WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `OBSERVER_URL` is not a WebSocket URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let defaults = Self::default();

        let url = env
            .get("OBSERVER_URL")
            .map_or(defaults.url, |v| v.trim().to_string());
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "OBSERVER_URL".to_string(),
                value: url,
            });
        }

        Ok(Self {
            url,
            reconnect_delay: env
                .duration_secs("OBSERVER_RECONNECT_DELAY_SECS")
                .unwrap_or(defaults.reconnect_delay),
            heartbeat_timeout: env
                .duration_secs("OBSERVER_HEARTBEAT_TIMEOUT_SECS")
                .map_or(defaults.heartbeat_timeout, non_zero),
            connect_timeout: env
                .duration_secs("OBSERVER_CONNECT_TIMEOUT_SECS")
                .filter(|d| !d.is_zero())
                .unwrap_or(defaults.connect_timeout),
            log_capacity: env.parse_or("OBSERVER_LOG_CAPACITY", defaults.log_capacity),
            order_history_capacity: env.parse_or(
                "OBSERVER_ORDER_HISTORY_CAPACITY",
                defaults.order_history_capacity,
            ),
            summary_interval: env
                .duration_secs("OBSERVER_SUMMARY_INTERVAL_SECS")
                .map_or(defaults.summary_interval, non_zero),
        })
    }
}

fn non_zero(period: Duration) -> Option<Duration> {
    (!period.is_zero()).then_some(period)
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an unrecognized value.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str) -> Option<Duration> {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}
