//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - **Driven Adapters (Outbound)**
//!   - `broker/`: Binance REST and the local order-matching simulator
//!   - `feed/`: Binance ticker stream and the simulated random walk
//!   - `broadcast/`: Fan-out of sync messages to observers
//!
//! - **Driver Adapters (Inbound)**
//!   - `http/`: Observer WebSocket stream, state snapshot and health probes
//!
//! - **Cross-cutting**
//!   - `config/`: Environment configuration
//!   - `metrics/`: Prometheus recorder
//!   - `telemetry/`: Tracing subscriber

pub mod broadcast;
pub mod broker;
pub mod config;
pub mod feed;
pub mod http;
pub mod metrics;
pub mod telemetry;
