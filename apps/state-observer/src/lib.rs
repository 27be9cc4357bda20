#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! State Observer - Remote State Mirror
//!
//! Connects to a bot engine's observer stream and keeps a reconciled local
//! copy of its positions, working orders, bot statuses and system log.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure reconciliation state
//!   - `store`: snapshot + delta folding, connection lifecycle
//!   - `log_buffer`: bounded system log ring
//!
//! - **Infrastructure**: Adapters
//!   - `client`: reconnecting WebSocket client
//!   - `config`: environment configuration
//!   - `telemetry`: tracing setup
//!
//! The observer never writes back to the engine.

/// Domain layer - reconciled state.
pub mod domain;

/// Infrastructure layer - engine connection, configuration, tracing.
pub mod infrastructure;

pub use domain::log_buffer::LogBuffer;
pub use domain::store::{ApplyOutcome, ConnectionStatus, ObserverStore, StoreSummary};
pub use infrastructure::client::{ObserverClient, ObserverClientError, SharedStore};
pub use infrastructure::config::{ConfigError, ObserverConfig};
