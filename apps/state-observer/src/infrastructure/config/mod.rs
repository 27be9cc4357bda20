//! Configuration Module
//!
//! Observer configuration loaded from environment variables.

mod settings;

pub use settings::{ConfigError, ObserverConfig};
