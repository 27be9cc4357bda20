//! Tracing Setup
//!
//! `RUST_LOG` drives the filter; `state_observer=info` is always added.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Service name logged at startup.
pub const SERVICE_NAME: &str = "state-observer";

/// Marks the lifetime of the installed subscriber.
pub struct TelemetryGuard(());

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = SERVICE_NAME, "Telemetry shut down");
    }
}

/// Install the global subscriber. A second call keeps the first one.
#[must_use]
#[allow(clippy::expect_used)]
pub fn init() -> TelemetryGuard {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "state_observer=info"
                .parse()
                .expect("static directive 'state_observer=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }

    tracing::info!(service = SERVICE_NAME, "Telemetry initialized");
    TelemetryGuard(())
}
