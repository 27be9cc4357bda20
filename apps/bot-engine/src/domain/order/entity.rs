//! Order entity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::request::OrderRequest;
use super::state_machine::OrderStateMachine;
use super::value_objects::{BracketRole, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::OrderId;

/// Link from an order to the bracket it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketLink {
    /// Id of the bracket's parent order (its own id for the parent).
    pub parent_id: OrderId,
    /// Role inside the bracket.
    pub role: BracketRole,
}

/// An order tracked by the ledger.
///
/// Fields are private; the ledger is the only writer. Observers receive
/// copies over the wire and read them through the accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    symbol: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: OrderType,
    quantity: Decimal,
    #[serde(rename = "price", default, skip_serializing_if = "Option::is_none")]
    limit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stop_price: Option<Decimal>,
    filled_quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    average_fill_price: Option<Decimal>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
    #[serde(default)]
    bot_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    venue_order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bracket: Option<BracketLink>,
}

impl Order {
    /// Create an OPEN order from a request.
    ///
    /// The request is not validated here; the ledger validates before
    /// constructing.
    #[must_use]
    pub fn new(id: OrderId, request: &OrderRequest, bot_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let bracket = (request.order_type == OrderType::Bracket).then(|| BracketLink {
            parent_id: id.clone(),
            role: BracketRole::Parent,
        });

        Self {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
            bot_name: bot_name.into(),
            venue_order_id: None,
            status_message: None,
            bracket,
        }
    }

    /// Create one exit leg of a bracket.
    ///
    /// Take-profit legs rest as LIMIT orders, stop-loss legs as STOP orders,
    /// both on the side opposite to the parent.
    #[must_use]
    pub(crate) fn bracket_child(
        parent: &Self,
        role: BracketRole,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        let now = Utc::now();
        let (order_type, limit_price, stop_price) = match role {
            BracketRole::StopLoss => (OrderType::Stop, None, Some(price)),
            BracketRole::TakeProfit | BracketRole::Parent => (OrderType::Limit, Some(price), None),
        };

        Self {
            id: OrderId::generate(),
            symbol: parent.symbol.clone(),
            side: parent.side.opposite(),
            order_type,
            quantity,
            limit_price,
            stop_price,
            filled_quantity: Decimal::ZERO,
            average_fill_price: None,
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
            bot_name: parent.bot_name.clone(),
            venue_order_id: None,
            status_message: None,
            bracket: Some(BracketLink {
                parent_id: parent.id.clone(),
                role,
            }),
        }
    }

    /// Rebuild an order from a venue's view of it.
    #[must_use]
    pub(crate) fn with_venue_state(
        mut self,
        venue_order_id: String,
        filled_quantity: Decimal,
        average_fill_price: Option<Decimal>,
        status: OrderStatus,
    ) -> Self {
        self.venue_order_id = Some(venue_order_id);
        self.filled_quantity = filled_quantity;
        self.average_fill_price = average_fill_price;
        self.status = status;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Order id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Instrument symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Requested quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Limit price, if any.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Stop price, if any.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Quantity still working.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Volume-weighted average fill price.
    #[must_use]
    pub const fn average_fill_price(&self) -> Option<Decimal> {
        self.average_fill_price
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last mutation time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Owning bot.
    #[must_use]
    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Venue-assigned id, once acknowledged.
    #[must_use]
    pub fn venue_order_id(&self) -> Option<&str> {
        self.venue_order_id.as_deref()
    }

    /// Venue message attached to a rejection.
    #[must_use]
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// Bracket membership.
    #[must_use]
    pub const fn bracket(&self) -> Option<&BracketLink> {
        self.bracket.as_ref()
    }

    /// Returns true while the order can still fill.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.status.can_fill()
    }

    // =========================================================================
    // Mutations (ledger only)
    // =========================================================================

    /// Record a cumulative fill and return the newly filled quantity.
    ///
    /// The caller guarantees `cumulative` is above the current filled
    /// quantity and at most the requested quantity.
    pub(crate) fn record_fill(&mut self, cumulative: Decimal, price: Decimal) -> Decimal {
        let delta = cumulative - self.filled_quantity;
        let prior_notional = self.average_fill_price.unwrap_or_default() * self.filled_quantity;
        self.average_fill_price = Some((prior_notional + price * delta) / cumulative);
        self.filled_quantity = cumulative;
        self.status = OrderStateMachine::status_for_fill(cumulative, self.quantity);
        self.updated_at = Utc::now();
        delta
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.status = OrderStatus::Cancelled;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_rejected(&mut self, message: String) {
        self.status = OrderStatus::Rejected;
        self.status_message = Some(message);
        self.updated_at = Utc::now();
    }

    pub(crate) fn set_venue_order_id(&mut self, venue_order_id: String) {
        self.venue_order_id = Some(venue_order_id);
        self.updated_at = Utc::now();
    }
}
