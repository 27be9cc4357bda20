//! Bot lifecycle status.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a bot session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BotState {
    /// Session is trading.
    Running,
    /// Session was stopped.
    Stopped,
    /// Session stopped on a fatal error.
    Error,
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Which strategy a bot runs, and on what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    /// Strategy name.
    pub name: String,
    /// Primary symbol.
    pub symbol: String,
    /// Free-form parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl StrategyDescriptor {
    /// Create a descriptor without parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            parameters: BTreeMap::new(),
        }
    }
}

/// Status of one bot, as published to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStatus {
    /// Bot name.
    pub name: String,
    /// Lifecycle state.
    pub status: BotState,
    /// Strategy descriptor.
    pub strategy: StrategyDescriptor,
    /// Error detail when `status` is `Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BotStatus {
    /// Create a status in the given state.
    #[must_use]
    pub fn new(name: impl Into<String>, status: BotState, strategy: StrategyDescriptor) -> Self {
        Self {
            name: name.into(),
            status,
            strategy,
            error: None,
        }
    }

    /// Copy of this status moved to `status`, clearing any error detail.
    #[must_use]
    pub fn with_state(&self, status: BotState) -> Self {
        Self {
            status,
            error: None,
            ..self.clone()
        }
    }

    /// Copy of this status moved to `Error` with a detail message.
    #[must_use]
    pub fn with_error(&self, detail: impl Into<String>) -> Self {
        Self {
            status: BotState::Error,
            error: Some(detail.into()),
            ..self.clone()
        }
    }
}
