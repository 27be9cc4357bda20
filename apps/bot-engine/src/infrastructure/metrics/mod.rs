//! Prometheus Metrics Module
//!
//! Exposes engine metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Orders**: placements, fills, rejections, cancellations per bot
//! - **Feeds**: ticks received and reconnect attempts per feed
//! - **Broadcast**: messages sent, coalesced, lagged observers
//! - **Sessions**: running sessions and open orders
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Order counters
    describe_counter!(
        "bot_engine_orders_placed_total",
        "Total orders recorded by session ledgers"
    );
    describe_counter!(
        "bot_engine_orders_filled_total",
        "Total fills applied to session ledgers"
    );
    describe_counter!(
        "bot_engine_orders_rejected_total",
        "Total orders rejected by validation or venue"
    );
    describe_counter!(
        "bot_engine_orders_cancelled_total",
        "Total orders cancelled"
    );
    describe_gauge!(
        "bot_engine_open_orders",
        "Orders currently working per bot"
    );

    // Feed counters
    describe_counter!(
        "bot_engine_ticks_received_total",
        "Total ticks delivered by market data feeds"
    );
    describe_counter!(
        "bot_engine_feed_reconnects_total",
        "Total market data feed reconnection attempts"
    );

    // Broadcast
    describe_counter!(
        "bot_engine_broadcast_messages_sent_total",
        "Total sync messages queued to observers"
    );
    describe_counter!(
        "bot_engine_broadcast_messages_coalesced_total",
        "Total sync messages replaced under backpressure"
    );
    describe_counter!(
        "bot_engine_observers_lagged_total",
        "Total observers closed for falling behind"
    );
    describe_gauge!("bot_engine_observers", "Number of attached observers");

    // Sessions
    describe_gauge!("bot_engine_sessions", "Number of running bot sessions");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Order lifecycle outcome labels.
#[derive(Debug, Clone, Copy)]
pub enum OrderOutcome {
    /// Recorded in the ledger.
    Placed,
    /// Fill applied.
    Filled,
    /// Refused.
    Rejected,
    /// Cancelled.
    Cancelled,
}

impl OrderOutcome {
    const fn metric_name(self) -> &'static str {
        match self {
            Self::Placed => "bot_engine_orders_placed_total",
            Self::Filled => "bot_engine_orders_filled_total",
            Self::Rejected => "bot_engine_orders_rejected_total",
            Self::Cancelled => "bot_engine_orders_cancelled_total",
        }
    }
}

/// Record an order lifecycle outcome for a bot.
pub fn record_order(outcome: OrderOutcome, bot: &str) {
    counter!(outcome.metric_name(), "bot" => bot.to_string()).increment(1);
}

/// Update the number of working orders for a bot.
pub fn set_open_orders(bot: &str, count: usize) {
    gauge!("bot_engine_open_orders", "bot" => bot.to_string()).set(count as f64);
}

/// Record a tick delivered by a feed.
pub fn record_tick(feed: &str) {
    counter!("bot_engine_ticks_received_total", "feed" => feed.to_string()).increment(1);
}

/// Record a feed reconnection attempt.
pub fn record_reconnect(feed: &str) {
    counter!("bot_engine_feed_reconnects_total", "feed" => feed.to_string()).increment(1);
}

/// Record sync messages queued to observers.
pub fn record_broadcast_sent(event: &'static str, count: u64) {
    counter!("bot_engine_broadcast_messages_sent_total", "event" => event).increment(count);
}

/// Record a sync message replaced under backpressure.
pub fn record_broadcast_coalesced(event: &'static str) {
    counter!("bot_engine_broadcast_messages_coalesced_total", "event" => event).increment(1);
}

/// Record an observer closed for lagging.
pub fn record_observer_lagged() {
    counter!("bot_engine_observers_lagged_total").increment(1);
}

/// Update the attached observer count.
pub fn set_observers(count: usize) {
    gauge!("bot_engine_observers").set(count as f64);
}

/// Adjust the running session count.
pub fn adjust_sessions(delta: f64) {
    gauge!("bot_engine_sessions").increment(delta);
}

// =============================================================================
// Tests
// =============================================================================
