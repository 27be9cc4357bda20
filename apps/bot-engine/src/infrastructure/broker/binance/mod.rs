//! Binance Spot Broker Adapter
//!
//! Implementation of the `Broker` port for the Binance spot REST API with:
//! - HMAC-SHA256 signed requests
//! - Retry logic with exponential backoff
//! - Environment-aware safety checks (TESTNET vs LIVE)
//! - Cumulative fill reconstruction from polled order state

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;
pub mod symbols;

pub use adapter::BinanceBroker;
pub use config::{BinanceConfig, BinanceEnvironment, RetryConfig};
pub use error::BinanceError;
