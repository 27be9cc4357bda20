//! Broker Port (Driven Port)
//!
//! Interface for routing orders to a venue. One implementation per venue.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::ledger::ExecutionReport;
use crate::domain::market::Tick;
use crate::domain::order::Order;
use crate::domain::position::PositionSnapshot;

/// Broker port error.
///
/// Venue-specific failures are normalized into these before crossing the
/// port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Authentication, handshake or transport failure.
    #[error("Broker connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// The venue refused the request.
    #[error("Order rejected: {message}")]
    OrderRejected {
        /// Venue message, verbatim.
        message: String,
    },

    /// The venue does not know the order.
    #[error("Order not found: {order_id}")]
    UnknownOrder {
        /// The missing order id.
        order_id: String,
    },
}

impl BrokerError {
    /// Text recorded on a rejected order.
    #[must_use]
    pub fn venue_message(&self) -> &str {
        match self {
            Self::ConnectionError { message } | Self::OrderRejected { message } => message,
            Self::UnknownOrder { order_id } => order_id,
        }
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Venue name for logs and metrics.
    fn name(&self) -> &str;

    /// Authenticate and verify the venue is reachable.
    ///
    /// Failure is fatal to session start; implementations do not retry.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Submit an order.
    ///
    /// `reference_price` is the latest known price for the symbol; venues
    /// that fill synchronously use it for MARKET orders. Returns whatever
    /// the venue reported synchronously (acknowledgement, immediate fills,
    /// rejection).
    async fn place_order(
        &self,
        order: &Order,
        reference_price: Option<Decimal>,
    ) -> Result<Vec<ExecutionReport>, BrokerError>;

    /// Cancel a working order. Returns `false` when the venue says it is no
    /// longer cancelable.
    async fn cancel_order(&self, order: &Order) -> Result<bool, BrokerError>;

    /// Venue-side positions in canonical shape.
    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError>;

    /// Venue-side working orders in canonical shape.
    async fn get_open_orders(&self) -> Result<Vec<Order>, BrokerError>;

    /// Ask the venue for changes to the given working orders.
    async fn poll_executions(
        &self,
        _open_orders: &[Order],
    ) -> Result<Vec<ExecutionReport>, BrokerError> {
        Ok(Vec::new())
    }

    /// Let a venue that matches locally react to a tick.
    fn match_tick(&self, _tick: &Tick) -> Vec<ExecutionReport> {
        Vec::new()
    }
}
