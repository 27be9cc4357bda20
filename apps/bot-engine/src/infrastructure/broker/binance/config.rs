//! Binance adapter configuration.

use std::time::Duration;

/// Environment for the Binance spot REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceEnvironment {
    /// Spot testnet (paper trading).
    Testnet,
    /// Production (real money).
    Live,
}

impl BinanceEnvironment {
    /// Base URL of the REST API, including the `/api/v3` prefix.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://testnet.binance.vision/api/v3",
            Self::Live => "https://api.binance.com/api/v3",
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl std::fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Testnet => write!(f, "TESTNET"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Configuration for the Binance broker adapter.
#[derive(Clone)]
pub struct BinanceConfig {
    /// API key, sent as `X-MBX-APIKEY`.
    pub api_key: String,
    /// API secret used to sign queries.
    pub api_secret: String,
    /// Trading environment.
    pub environment: BinanceEnvironment,
    /// Base URL override (local mock servers).
    pub base_url: Option<String>,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// `recvWindow` sent with signed requests.
    pub recv_window: Duration,
    /// Retry policy configuration.
    pub retry: RetryConfig,
}

impl std::fmt::Debug for BinanceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("recv_window", &self.recv_window)
            .field("retry", &self.retry)
            .finish()
    }
}

impl BinanceConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, environment: BinanceEnvironment) -> Self {
        Self {
            api_key,
            api_secret,
            environment,
            base_url: None,
            timeout: Duration::from_secs(10),
            recv_window: Duration::from_millis(5000),
            retry: RetryConfig::default(),
        }
    }

    /// Point the adapter at a different REST root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Effective REST root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
    }
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn environment_urls() {
        assert_eq!(
            BinanceEnvironment::Testnet.base_url(),
            "https://testnet.binance.vision/api/v3"
        );
        assert_eq!(
            BinanceEnvironment::Live.base_url(),
            "https://api.binance.com/api/v3"
        );
        assert!(BinanceEnvironment::Live.is_live());
        assert!(!BinanceEnvironment::Testnet.is_live());
    }

    #[test]
    fn base_url_override_wins() {
        let config = BinanceConfig::new("k".into(), "s".into(), BinanceEnvironment::Live)
            .with_base_url("http://127.0.0.1:9999/api/v3");
        assert_eq!(config.base_url(), "http://127.0.0.1:9999/api/v3");
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = BinanceConfig::new(
            "my-key".into(),
            "my-secret".into(),
            BinanceEnvironment::Testnet,
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("my-key"));
        assert!(!debug.contains("my-secret"));
        assert!(debug.contains("Testnet"));
    }

    #[test]
    fn retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff, Duration::from_millis(100));
        assert_eq!(retry.multiplier, 2.0);
    }
}
