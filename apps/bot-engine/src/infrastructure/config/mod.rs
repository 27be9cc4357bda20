//! Configuration Module
//!
//! Engine configuration loaded from environment variables.

mod settings;

pub use settings::{
    BotSettings, BroadcastSettings, BrokerKind, ConfigError, Credentials, EngineConfig,
    FeedKind, FeedSettings, ServerSettings, SessionSettings, TradingMode,
};
