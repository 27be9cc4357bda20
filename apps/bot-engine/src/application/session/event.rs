//! Session queue messages.

use rust_decimal::Decimal;
use tokio::sync::oneshot;

use super::SessionError;
use crate::application::ports::FeedEvent;
use crate::domain::bot::BotStatus;
use crate::domain::ledger::Placement;
use crate::domain::order::{Order, OrderRequest};
use crate::domain::position::{PositionSnapshot, TradeRecord};
use crate::domain::shared::OrderId;

/// Everything a session worker consumes, in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Market data feed output.
    Feed(FeedEvent),

    /// Record an order and route it to the broker.
    PlaceOrder {
        /// What to place.
        request: OrderRequest,
        /// Price for venues that fill MARKET orders synchronously; the last
        /// tick for the symbol is used when absent.
        reference_price: Option<Decimal>,
        /// Receives the ledger placement once recorded.
        reply: oneshot::Sender<Result<Placement, SessionError>>,
    },

    /// Ask the broker to cancel a working order.
    CancelOrder {
        /// Ledger order id.
        order_id: OrderId,
        /// Receives whether a cancel was sent.
        reply: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Read the ledger.
    Snapshot {
        /// Receives the current state.
        reply: oneshot::Sender<SessionSnapshot>,
    },

    /// Shut the session down.
    Stop {
        /// Receives the final status.
        reply: oneshot::Sender<BotStatus>,
    },
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Lifecycle status.
    pub status: BotStatus,
    /// Every position, priced at the latest marks.
    pub positions: Vec<PositionSnapshot>,
    /// Working orders in creation order.
    pub open_orders: Vec<Order>,
    /// All orders in creation order.
    pub orders: Vec<Order>,
    /// Fill history.
    pub trades: Vec<TradeRecord>,
}
