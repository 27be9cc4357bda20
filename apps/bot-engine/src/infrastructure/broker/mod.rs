//! Broker Adapters
//!
//! Implementations of the `Broker` port: an in-memory simulator and the
//! Binance spot REST API (live or testnet).

pub mod binance;
mod simulated;

pub use binance::{BinanceBroker, BinanceConfig, BinanceEnvironment, BinanceError};
pub use simulated::SimulatedBroker;
