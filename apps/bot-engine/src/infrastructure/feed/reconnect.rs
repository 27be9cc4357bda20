//! Reconnection Policy
//!
//! Linear backoff: attempt `n` waits `base × n`, up to a fixed number of
//! attempts, after which the feed gives up for good.

use std::time::Duration;

/// Default delay unit between reconnect attempts.
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit; attempt `n` waits `base × n`.
    pub base_delay: Duration,
    /// Attempts before the feed terminates.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }
}

/// Reconnection attempt counter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create a policy with no attempts made.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.config.max_attempts {
            return None;
        }
        self.current_attempt += 1;
        Some(self.config.base_delay * self.current_attempt)
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Maximum attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_linearly() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(policy.current_attempt(), 5);
    }

    #[test]
    fn reset_starts_over() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(10), 2));
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert!(policy.next_delay().is_none());

        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn zero_attempts_never_reconnects() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::new(Duration::from_millis(10), 0));
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.max_attempts(), 0);
    }
}
