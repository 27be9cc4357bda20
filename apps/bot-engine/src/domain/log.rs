//! System log entries streamed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a system log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// A command was received.
    Cmd,
    /// A trade executed.
    Trade,
    /// Something failed.
    Error,
    /// Risk notice.
    Risk,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Cmd => "CMD",
            Self::Trade => "TRADE",
            Self::Error => "ERROR",
            Self::Risk => "RISK",
        };
        f.write_str(label)
    }
}

/// One line of the system log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemLog {
    /// When the entry was produced.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub level: LogLevel,
    /// Originating service (bot name or engine component).
    pub service: String,
    /// Human-readable text.
    pub message: String,
}

impl SystemLog {
    /// Create an entry stamped now.
    #[must_use]
    pub fn new(level: LogLevel, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            service: service.into(),
            message: message.into(),
        }
    }
}
