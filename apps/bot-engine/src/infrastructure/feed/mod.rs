//! Market Data Feeds
//!
//! Implementations of the `DataFeed` port: a local random walk and the
//! Binance ticker stream. Both push into the owning session's queue through
//! a `FeedSink`.

pub mod binance;
mod heartbeat;
mod reconnect;
pub mod simulated;

pub use binance::{BinanceFeed, BinanceFeedConfig, DEFAULT_STREAM_URL};
pub use heartbeat::HeartbeatConfig;
pub use reconnect::{DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE, ReconnectConfig};
pub use simulated::{SimulatedFeed, SimulatedFeedConfig};
