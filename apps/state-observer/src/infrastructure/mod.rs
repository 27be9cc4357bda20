//! Infrastructure Layer - Engine connection and process plumbing.

/// Reconnecting observer WebSocket client.
pub mod client;

/// Environment configuration.
pub mod config;

/// Tracing setup.
pub mod telemetry;
