// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Bot Engine - Execution & State Sync Core
//!
//! Runs trading bot sessions and streams their state to remote observers.
//!
//! # Architecture (Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core logic with no I/O
//!   - `order`: Order entity, requests, status state machine
//!   - `ledger`: Per-session order ledger, fills, positions, bracket OCO
//!   - `position`: Signed positions with average price and realized P&L
//!   - `sync`: Observer wire protocol (snapshot + deltas)
//!
//! - **Application**: Orchestration
//!   - `ports`: `Broker`, `DataFeed`, `StatePublisher`
//!   - `session`: `BotSession` actor owning ledger, broker and feed
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: Binance (testnet/live) and the simulator
//!   - `feed`: Binance ticker stream and the simulated feed
//!   - `broadcast`: `StateBroadcaster` with per-observer coalescing queues
//!   - `http`: Observer WebSocket and health endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Hexagonal Architecture Layers
// =============================================================================

/// Domain layer - Core logic with no external dependencies.
pub mod domain;

/// Application layer - Session orchestration and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::bot::{BotState, BotStatus, StrategyDescriptor};
pub use domain::ledger::{ExecutionReport, LedgerError, OrderLedger};
pub use domain::order::{Order, OrderRequest, OrderSide, OrderStatus, OrderType};
pub use domain::position::{Position, PositionKey, PositionSnapshot};
pub use domain::shared::OrderId;
pub use domain::sync::{StateSnapshot, SyncMessage};

// Application re-exports
pub use application::ports::{
    Broker, BrokerError, DataFeed, FeedError, FeedEvent, FeedSink, StatePublisher,
};
pub use application::session::{BotSession, SessionConfig, SessionError, SessionHandle};

// Infrastructure re-exports
pub use infrastructure::broadcast::{BroadcastConfig, StateBroadcaster};
pub use infrastructure::broker::{BinanceBroker, BinanceConfig, BinanceEnvironment, SimulatedBroker};
pub use infrastructure::config::{ConfigError, EngineConfig};
pub use infrastructure::feed::{BinanceFeed, BinanceFeedConfig, SimulatedFeed, SimulatedFeedConfig};
pub use infrastructure::http::{HttpServer, HttpServerState};
pub use infrastructure::metrics::init_metrics;
