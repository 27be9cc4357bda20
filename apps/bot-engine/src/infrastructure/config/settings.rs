//! Engine Configuration Settings
//!
//! Configuration types for the bot engine, loaded from environment
//! variables. Call `dotenvy::dotenv()` first to pick up a `.env` file.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::application::session::{DEFAULT_QUEUE_CAPACITY, SessionConfig};
use crate::domain::bot::StrategyDescriptor;
use crate::infrastructure::broadcast::{
    BroadcastConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_OBSERVER_QUEUE_CAPACITY,
};
use crate::infrastructure::broker::{BinanceConfig, BinanceEnvironment};
use crate::infrastructure::feed::{
    BinanceFeedConfig, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE, DEFAULT_STREAM_URL,
    ReconnectConfig, SimulatedFeedConfig,
};

/// Which broker the session routes orders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerKind {
    /// Local order-matching simulator.
    #[default]
    Simulated,
    /// Binance spot REST API.
    Binance,
}

impl BrokerKind {
    /// Parse a broker name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "simulator" | "sim" => Some(Self::Simulated),
            "binance" => Some(Self::Binance),
            _ => None,
        }
    }
}

/// Which market data feed the session consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedKind {
    /// Local random walk.
    #[default]
    Simulated,
    /// Binance ticker stream.
    Binance,
}

impl FeedKind {
    /// Parse a feed name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "simulator" | "sim" => Some(Self::Simulated),
            "binance" => Some(Self::Binance),
            _ => None,
        }
    }
}

/// Trading mode (paper vs live).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TradingMode {
    /// Paper trading against the venue testnet.
    #[default]
    Paper,
    /// Live trading (real money).
    Live,
}

impl TradingMode {
    /// Parse a mode; anything but `live` is paper.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "LIVE" => Self::Live,
            _ => Self::Paper,
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Binance environment for this mode.
    #[must_use]
    pub const fn binance_environment(&self) -> BinanceEnvironment {
        match self {
            Self::Paper => BinanceEnvironment::Testnet,
            Self::Live => BinanceEnvironment::Live,
        }
    }
}

/// Venue API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Bot identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotSettings {
    /// Bot name.
    pub name: String,
    /// Strategy descriptor name.
    pub strategy: String,
    /// Symbols to trade.
    pub symbols: Vec<String>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            name: "bot-crypto".to_string(),
            strategy: "Manual".to_string(),
            symbols: vec!["BTC/USD".to_string()],
        }
    }
}

/// Feed settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Feed implementation.
    pub kind: FeedKind,
    /// Binance stream URL.
    pub stream_url: String,
    /// Linear reconnect delay unit.
    pub reconnect_base: Duration,
    /// Reconnect attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Simulated feed start price.
    pub simulated_start_price: Decimal,
    /// Simulated feed tick interval.
    pub simulated_tick_interval: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            kind: FeedKind::default(),
            stream_url: DEFAULT_STREAM_URL.to_string(),
            reconnect_base: DEFAULT_RECONNECT_BASE,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            simulated_start_price: dec!(69000),
            simulated_tick_interval: Duration::from_millis(1000),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Session queue bound.
    pub queue_capacity: usize,
    /// Venue execution polling period; `None` disables polling.
    pub poll_interval: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: Some(Duration::from_secs(5)),
        }
    }
}

/// Broadcaster settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Per-observer queue bound.
    pub observer_queue_capacity: usize,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            observer_queue_capacity: DEFAULT_OBSERVER_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Observer stream and health HTTP port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Bot identity.
    pub bot: BotSettings,
    /// Broker implementation.
    pub broker: BrokerKind,
    /// Paper or live.
    pub trading_mode: TradingMode,
    /// Venue credentials; present whenever `broker` is `Binance`.
    pub credentials: Option<Credentials>,
    /// Feed settings.
    pub feed: FeedSettings,
    /// Session settings.
    pub session: SessionSettings,
    /// Broadcaster settings.
    pub broadcast: BroadcastSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a broker or feed name is unknown, or if Binance
    /// credentials are required but missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let bot_defaults = BotSettings::default();
        let symbols = env.get("BOT_SYMBOLS").map_or(bot_defaults.symbols, |raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        });
        if symbols.is_empty() {
            return Err(ConfigError::EmptyValue("BOT_SYMBOLS".to_string()));
        }
        let bot = BotSettings {
            name: env.get("BOT_NAME").unwrap_or(bot_defaults.name),
            strategy: env.get("BOT_STRATEGY").unwrap_or(bot_defaults.strategy),
            symbols,
        };

        let broker = match env.get("BROKER") {
            Some(raw) => BrokerKind::parse(&raw).ok_or(ConfigError::InvalidValue {
                key: "BROKER".to_string(),
                value: raw,
            })?,
            None => BrokerKind::default(),
        };
        let trading_mode = env
            .get("TRADING_MODE")
            .map(|s| TradingMode::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let credentials = match broker {
            BrokerKind::Binance => Some(Credentials::new(
                env.required("BINANCE_API_KEY")?,
                env.required("BINANCE_API_SECRET")?,
            )),
            BrokerKind::Simulated => None,
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            kind: match env.get("FEED") {
                Some(raw) => FeedKind::parse(&raw).ok_or(ConfigError::InvalidValue {
                    key: "FEED".to_string(),
                    value: raw,
                })?,
                None => FeedKind::default(),
            },
            stream_url: env.get("BINANCE_STREAM_URL").unwrap_or(feed_defaults.stream_url),
            reconnect_base: env.duration_millis("FEED_RECONNECT_BASE_MS", feed_defaults.reconnect_base),
            max_reconnect_attempts: env.parse_or(
                "FEED_MAX_RECONNECT_ATTEMPTS",
                feed_defaults.max_reconnect_attempts,
            ),
            simulated_start_price: env.parse_or(
                "SIMULATED_START_PRICE",
                feed_defaults.simulated_start_price,
            ),
            simulated_tick_interval: env.duration_millis(
                "SIMULATED_TICK_INTERVAL_MS",
                feed_defaults.simulated_tick_interval,
            ),
        };

        let session_defaults = SessionSettings::default();
        let poll_secs: u64 = env.parse_or(
            "SESSION_POLL_INTERVAL_SECS",
            session_defaults.poll_interval.map_or(0, |d| d.as_secs()),
        );
        let session = SessionSettings {
            queue_capacity: env.parse_or("SESSION_QUEUE_CAPACITY", session_defaults.queue_capacity),
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
        };

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            observer_queue_capacity: env.parse_or(
                "BROADCAST_OBSERVER_QUEUE_CAPACITY",
                broadcast_defaults.observer_queue_capacity,
            ),
            heartbeat_interval: env.duration_secs(
                "BROADCAST_HEARTBEAT_INTERVAL_SECS",
                broadcast_defaults.heartbeat_interval,
            ),
        };

        let server = ServerSettings {
            http_port: env.parse_or("HTTP_PORT", ServerSettings::default().http_port),
        };

        Ok(Self {
            bot,
            broker,
            trading_mode,
            credentials,
            feed,
            session,
            broadcast,
            server,
        })
    }

    /// Session configuration for the configured bot.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let primary = self.bot.symbols.first().cloned().unwrap_or_default();
        let config = SessionConfig::new(self.bot.name.clone(), self.bot.symbols.clone())
            .with_strategy(StrategyDescriptor::new(self.bot.strategy.clone(), primary))
            .with_queue_capacity(self.session.queue_capacity);
        match self.session.poll_interval {
            Some(period) => config.with_poll_interval(period),
            None => config,
        }
    }

    /// Broadcaster configuration.
    #[must_use]
    pub fn broadcast_config(&self) -> BroadcastConfig {
        BroadcastConfig {
            observer_queue_capacity: self.broadcast.observer_queue_capacity,
            heartbeat_interval: self.broadcast.heartbeat_interval,
            service_name: "bot-engine".to_string(),
        }
    }

    /// Binance REST configuration, when credentials are configured.
    #[must_use]
    pub fn binance_config(&self) -> Option<BinanceConfig> {
        self.credentials.as_ref().map(|creds| {
            BinanceConfig::new(
                creds.api_key().to_string(),
                creds.api_secret().to_string(),
                self.trading_mode.binance_environment(),
            )
        })
    }

    /// Binance stream configuration.
    #[must_use]
    pub fn binance_feed_config(&self) -> BinanceFeedConfig {
        BinanceFeedConfig {
            reconnect: ReconnectConfig::new(self.feed.reconnect_base, self.feed.max_reconnect_attempts),
            ..BinanceFeedConfig::with_url(self.feed.stream_url.clone())
        }
    }

    /// Simulated feed configuration.
    #[must_use]
    pub fn simulated_feed_config(&self) -> SimulatedFeedConfig {
        SimulatedFeedConfig {
            start_price: self.feed.simulated_start_price,
            interval: self.feed.simulated_tick_interval,
            ..SimulatedFeedConfig::default()
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
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

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Err(ConfigError::MissingEnvVar(key.to_string())),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v),
        }
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn load(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EngineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bot, BotSettings::default());
        assert_eq!(config.broker, BrokerKind::Simulated);
        assert_eq!(config.trading_mode, TradingMode::Paper);
        assert!(config.credentials.is_none());
        assert_eq!(config.feed.kind, FeedKind::Simulated);
        assert_eq!(config.feed.stream_url, "wss://stream.binance.com:9443/ws");
        assert_eq!(config.feed.reconnect_base, Duration::from_millis(1000));
        assert_eq!(config.feed.max_reconnect_attempts, 5);
        assert_eq!(config.session.queue_capacity, 1024);
        assert_eq!(config.session.poll_interval, Some(Duration::from_secs(5)));
        assert_eq!(config.broadcast.observer_queue_capacity, 1024);
        assert_eq!(config.broadcast.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn symbols_are_split_and_trimmed() {
        let config = load(&[("BOT_SYMBOLS", " BTC/USD, ETH/USD ,,")]).unwrap();
        assert_eq!(config.bot.symbols, ["BTC/USD", "ETH/USD"]);
    }

    #[test]
    fn empty_symbol_list_is_rejected() {
        let err = load(&[("BOT_SYMBOLS", " , ")]).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "BOT_SYMBOLS"));
    }

    #[test]
    fn binance_broker_requires_credentials() {
        let err = load(&[("BROKER", "binance")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "BINANCE_API_KEY"));

        let err = load(&[
            ("BROKER", "binance"),
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_API_SECRET", ""),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "BINANCE_API_SECRET"));
    }

    #[test]
    fn binance_live_maps_to_live_environment() {
        let config = load(&[
            ("BROKER", "Binance"),
            ("TRADING_MODE", "live"),
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_API_SECRET", "secret"),
        ])
        .unwrap();

        let binance = config.binance_config().unwrap();
        assert_eq!(binance.environment, BinanceEnvironment::Live);
        assert_eq!(binance.api_key, "key");
    }

    #[test]
    fn unknown_broker_is_rejected() {
        let err = load(&[("BROKER", "alpaca")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "BROKER"));
    }

    #[test]
    fn zero_poll_interval_disables_polling() {
        let config = load(&[("SESSION_POLL_INTERVAL_SECS", "0")]).unwrap();
        assert_eq!(config.session.poll_interval, None);
        assert_eq!(config.session_config().poll_interval, None);
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = load(&[("HTTP_PORT", "eighty"), ("FEED_MAX_RECONNECT_ATTEMPTS", "-1")]).unwrap();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.feed.max_reconnect_attempts, 5);
    }

    #[test]
    fn feed_configs_follow_settings() {
        let config = load(&[
            ("FEED", "binance"),
            ("BINANCE_STREAM_URL", "ws://127.0.0.1:9000/ws"),
            ("FEED_RECONNECT_BASE_MS", "250"),
            ("FEED_MAX_RECONNECT_ATTEMPTS", "3"),
            ("SIMULATED_START_PRICE", "100.5"),
        ])
        .unwrap();

        let binance = config.binance_feed_config();
        assert_eq!(binance.url, "ws://127.0.0.1:9000/ws");
        assert_eq!(binance.reconnect, ReconnectConfig::new(Duration::from_millis(250), 3));
        assert_eq!(config.simulated_feed_config().start_price, dec!(100.5));
    }

    #[test]
    fn session_config_uses_strategy_and_primary_symbol() {
        let config = load(&[("BOT_STRATEGY", "Grid"), ("BOT_SYMBOLS", "ETH/USD,BTC/USD")]).unwrap();
        let session = config.session_config();
        assert_eq!(session.strategy.name, "Grid");
        assert_eq!(session.strategy.symbol, "ETH/USD");
    }

    #[test_case("paper", TradingMode::Paper ; "paper")]
    #[test_case("LIVE", TradingMode::Live ; "live upper")]
    #[test_case("live", TradingMode::Live ; "live lower")]
    #[test_case("bogus", TradingMode::Paper ; "unknown is paper")]
    fn trading_mode_parsing(raw: &str, expected: TradingMode) {
        assert_eq!(TradingMode::from_str_case_insensitive(raw), expected);
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }
}
