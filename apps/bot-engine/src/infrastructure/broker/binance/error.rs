//! Binance-specific error types.

use thiserror::Error;

use crate::application::ports::BrokerError;

/// Binance code for cancel/query of an order the venue does not know.
pub const UNKNOWN_ORDER_CODE: i64 = -2011;
/// Binance code for `GET /order` on an order that does not exist.
pub const ORDER_DOES_NOT_EXIST_CODE: i64 = -2013;

/// Errors from the Binance adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinanceError {
    /// HTTP request could not be built.
    #[error("HTTP error: {0}")]
    Http(String),

    /// API returned an error body.
    #[error("{message}")]
    Api {
        /// Binance error code (negative).
        code: i64,
        /// Venue message.
        message: String,
    },

    /// Credentials missing or refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limited.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Network error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// Order cannot be expressed on Binance spot.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

impl BinanceError {
    /// Returns true when the venue reported an order it does not know.
    #[must_use]
    pub const fn is_unknown_order(&self) -> bool {
        matches!(
            self,
            Self::Api {
                code: UNKNOWN_ORDER_CODE | ORDER_DOES_NOT_EXIST_CODE,
                ..
            }
        )
    }
}

impl From<BinanceError> for BrokerError {
    fn from(err: BinanceError) -> Self {
        match err {
            BinanceError::Http(msg) | BinanceError::Network(msg) => {
                Self::ConnectionError { message: msg }
            }
            BinanceError::AuthenticationFailed(msg) => Self::ConnectionError {
                message: format!("Authentication failed: {msg}"),
            },
            BinanceError::MaxRetriesExceeded { attempts } => Self::ConnectionError {
                message: format!("Max retries exceeded after {attempts} attempts"),
            },
            BinanceError::Api { message, .. }
            | BinanceError::InvalidOrder(message)
            | BinanceError::JsonParse(message) => Self::OrderRejected { message },
            BinanceError::RateLimited { retry_after_secs } => Self::OrderRejected {
                message: format!("Rate limited, retry after {retry_after_secs}s"),
            },
        }
    }
}
