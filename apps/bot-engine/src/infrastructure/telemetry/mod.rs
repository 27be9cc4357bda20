//! Tracing Setup
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` driven by
//! `RUST_LOG` plus crate defaults, and a `fmt` layer with targets.
//!
//! # Usage
//!
//! ```ignore
//! use bot_engine::infrastructure::telemetry;
//!
//! // Initialize at startup (returns guard that must be kept alive)
//! let _guard = telemetry::init();
//! ```

use std::time::Instant;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default service name.
const DEFAULT_SERVICE_NAME: &str = "bot-engine";

/// Logs the service uptime when dropped.
pub struct TelemetryGuard {
    service_name: String,
    started_at: Instant,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(
            service = %self.service_name,
            uptime_secs = self.started_at.elapsed().as_secs(),
            "Telemetry shut down"
        );
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name logged at start and stop.
    pub service_name: String,
    /// Include source file and line in log lines.
    pub with_source_location: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            with_source_location: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
        let with_source_location = std::env::var("LOG_SOURCE_LOCATION")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            service_name,
            with_source_location,
        }
    }
}

/// Initialize telemetry with configuration from environment.
///
/// Returns a guard that must be kept alive for the duration of the program.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env())
}

/// Initialize telemetry with custom configuration.
///
/// A second call leaves the first subscriber in place.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "bot_engine=info"
                .parse()
                .expect("static directive 'bot_engine=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "hyper=warn"
                .parse()
                .expect("static directive 'hyper=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(config.with_source_location)
        .with_line_number(config.with_source_location);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    TelemetryGuard {
        service_name: config.service_name,
        started_at: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "bot-engine");
        assert!(!config.with_source_location);
    }

    #[test]
    fn init_twice_is_harmless() {
        let first = init_with_config(TelemetryConfig::default());
        let second = init_with_config(TelemetryConfig::default());
        drop(second);
        drop(first);
    }
}
