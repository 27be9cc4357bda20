//! Socket liveness tracking.
//!
//! The connection task pings on a fixed interval; a ping left unanswered
//! (no pong and no other frame) for longer than the timeout marks the
//! connection dead so the reconnect loop takes over.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
    /// Silence tolerated after a ping before the connection is dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

/// What the connection task should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    SendPing,
    /// The peer went silent; drop the connection.
    Timeout,
}

/// Per-connection liveness state.
#[derive(Debug)]
pub struct HeartbeatState {
    config: HeartbeatConfig,
    last_seen: Instant,
    ping_sent_at: Option<Instant>,
}

impl HeartbeatState {
    /// Fresh state for a new connection.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            last_seen: Instant::now(),
            ping_sent_at: None,
        }
    }

    /// Record any inbound frame (pongs included).
    pub fn record_activity(&mut self) {
        self.last_seen = Instant::now();
        self.ping_sent_at = None;
    }

    /// Decide what to do on a ping interval tick.
    pub fn on_tick(&mut self) -> HeartbeatAction {
        let now = Instant::now();
        if let Some(sent) = self.ping_sent_at
            && now.duration_since(sent) > self.config.pong_timeout
        {
            tracing::warn!(
                silent_secs = now.duration_since(self.last_seen).as_secs(),
                timeout_secs = self.config.pong_timeout.as_secs(),
                "Heartbeat timeout detected"
            );
            return HeartbeatAction::Timeout;
        }
        if self.ping_sent_at.is_none() {
            self.ping_sent_at = Some(now);
        }
        HeartbeatAction::SendPing
    }

    /// Ping interval of this connection.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }
}
