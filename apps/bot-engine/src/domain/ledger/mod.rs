//! Order Ledger
//!
//! In-memory authoritative store of orders, positions and trade history for
//! one bot session. Pure state and transition logic: no I/O, no clocks
//! beyond timestamps, no channels.
//!
//! Every mutation queues [`LedgerEvent`]s for observers and, where the
//! ledger itself decides something must happen at the venue (an activated
//! bracket child, an OCO sibling), a [`VenueAction`]. The owner drains both
//! with [`OrderLedger::drain`] after each call.
//!
//! # Fill semantics
//!
//! Fills are cumulative reports. A report at or below the recorded filled
//! quantity is ignored, so replaying a report is harmless. A report above
//! the requested quantity is clamped to it.

mod bracket;

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

pub use bracket::BracketChildren;
use bracket::BracketBook;

use crate::domain::market::Tick;
use crate::domain::order::{
    Order, OrderRequest, OrderStateMachine, OrderStatus, OrderType, OrderValidationError,
};
use crate::domain::position::{Position, PositionKey, PositionSnapshot, TradeRecord};
use crate::domain::shared::OrderId;

// =============================================================================
// Errors
// =============================================================================

/// Ledger operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No order with this id exists in the ledger.
    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    /// The placement request failed validation.
    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderValidationError),
}

// =============================================================================
// Inputs and outputs
// =============================================================================

/// What a venue (or the simulator) reports about an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionReport {
    /// The venue acknowledged the order.
    Accepted {
        /// Ledger order id.
        order_id: OrderId,
        /// Venue-assigned id.
        venue_order_id: String,
    },
    /// Cumulative fill.
    Fill {
        /// Ledger order id.
        order_id: OrderId,
        /// Total filled so far (not the increment).
        cumulative_quantity: Decimal,
        /// Price of this execution.
        price: Decimal,
    },
    /// The order is no longer working at the venue.
    Cancelled {
        /// Ledger order id.
        order_id: OrderId,
    },
    /// The venue refused the order.
    Rejected {
        /// Ledger order id.
        order_id: OrderId,
        /// Venue message, verbatim.
        message: String,
    },
}

impl ExecutionReport {
    /// Id of the order the report concerns.
    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        match self {
            Self::Accepted { order_id, .. }
            | Self::Fill { order_id, .. }
            | Self::Cancelled { order_id }
            | Self::Rejected { order_id, .. } => order_id,
        }
    }
}

/// Result of [`OrderLedger::place_order`].
///
/// Non-bracket types yield exactly one order. A bracket yields its parent;
/// `children` is `None` at placement because the exit legs only exist once
/// the parent fills, at which point they are reported through the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// A single order.
    Single(Order),
    /// A bracket parent and, once activated, its children.
    Bracket {
        /// Entry order.
        parent: Order,
        /// Exit legs, if already active.
        children: Option<BracketChildren>,
    },
}

impl Placement {
    /// The order to submit to the venue.
    #[must_use]
    pub const fn primary(&self) -> &Order {
        match self {
            Self::Single(order) | Self::Bracket { parent: order, .. } => order,
        }
    }
}

/// State change for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    /// An order was created or changed.
    Order(Order),
    /// A position changed (fill or mark).
    Position(PositionSnapshot),
    /// A fill was applied.
    Trade(TradeRecord),
}

/// Venue work the ledger decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueAction {
    /// Submit a newly activated bracket child.
    Submit(Order),
    /// Withdraw an order cancelled by one-cancels-other.
    Cancel(Order),
}

/// Queued output of ledger mutations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerOutbox {
    /// Observer events, in emission order.
    pub events: Vec<LedgerEvent>,
    /// Venue actions, in decision order.
    pub actions: Vec<VenueAction>,
}

impl LedgerOutbox {
    /// Returns true when nothing was queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.actions.is_empty()
    }
}

/// Totals reported when a ledger is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSummary {
    /// Orders ever placed, children included.
    pub orders: usize,
    /// Orders still working at teardown.
    pub open_orders: usize,
    /// Fills applied.
    pub trades: usize,
    /// Realized P&L across all positions.
    pub realized_pnl: Decimal,
}

// =============================================================================
// Ledger
// =============================================================================

/// Authoritative order and position store for one bot session.
#[derive(Debug)]
pub struct OrderLedger {
    bot_name: String,
    orders: HashMap<OrderId, Order>,
    sequence: Vec<OrderId>,
    positions: BTreeMap<PositionKey, Position>,
    marks: HashMap<String, Decimal>,
    trades: Vec<TradeRecord>,
    brackets: BracketBook,
    outbox: LedgerOutbox,
}

impl OrderLedger {
    /// Create an empty ledger for `bot_name`.
    #[must_use]
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            orders: HashMap::new(),
            sequence: Vec::new(),
            positions: BTreeMap::new(),
            marks: HashMap::new(),
            trades: Vec::new(),
            brackets: BracketBook::default(),
            outbox: LedgerOutbox::default(),
        }
    }

    /// Owning bot.
    #[must_use]
    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Take everything queued since the last drain.
    pub fn drain(&mut self) -> LedgerOutbox {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Validate a request and record the resulting OPEN order.
    pub fn place_order(&mut self, request: &OrderRequest) -> Result<Placement, LedgerError> {
        request.validate()?;

        let order = Order::new(OrderId::generate(), request, self.bot_name.clone());
        tracing::info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            order_type = %order.order_type(),
            quantity = %order.quantity(),
            "Order recorded"
        );

        if order.order_type() == OrderType::Bracket
            && let (Some(take_profit), Some(stop_loss)) =
                (request.take_profit_price, request.stop_loss_price)
        {
            self.brackets
                .register(order.id().clone(), take_profit, stop_loss);
        }

        self.insert(order.clone());

        Ok(match order.order_type() {
            OrderType::Bracket => Placement::Bracket {
                parent: order,
                children: None,
            },
            _ => Placement::Single(order),
        })
    }

    /// Apply a cumulative fill report.
    ///
    /// Returns `false` when the report was ignored (terminal order or stale
    /// cumulative quantity).
    pub fn apply_fill(
        &mut self,
        order_id: &OrderId,
        cumulative_quantity: Decimal,
        price: Decimal,
    ) -> Result<bool, LedgerError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.clone()))?;

        if order.status().is_terminal() {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status(),
                "Ignoring fill for terminal order"
            );
            return Ok(false);
        }
        if cumulative_quantity <= order.filled_quantity() {
            tracing::debug!(
                order_id = %order_id,
                cumulative = %cumulative_quantity,
                filled = %order.filled_quantity(),
                "Ignoring stale fill report"
            );
            return Ok(false);
        }

        let mut cumulative = cumulative_quantity;
        if cumulative > order.quantity() {
            tracing::warn!(
                order_id = %order_id,
                cumulative = %cumulative,
                requested = %order.quantity(),
                "Fill exceeds requested quantity, clamping"
            );
            cumulative = order.quantity();
        }

        let delta = order.record_fill(cumulative, price);
        let order = order.clone();
        tracing::info!(
            order_id = %order.id(),
            symbol = %order.symbol(),
            filled = %order.filled_quantity(),
            price = %price,
            status = %order.status(),
            "Fill applied"
        );
        self.outbox.events.push(LedgerEvent::Order(order.clone()));

        if let Some(sibling_id) = self.brackets.resolve(&order) {
            self.cancel_sibling(&sibling_id);
        }

        self.update_position(&order, delta, price);

        if order.order_type() == OrderType::Bracket && order.status() == OrderStatus::Filled {
            self.activate_children(&order, order.quantity());
        }

        Ok(true)
    }

    /// Cancel a working order.
    ///
    /// Returns `false` when the order is already terminal.
    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<bool, LedgerError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.clone()))?;

        if !OrderStateMachine::is_valid_transition(order.status(), OrderStatus::Cancelled) {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status(),
                "Ignoring cancel for terminal order"
            );
            return Ok(false);
        }

        order.mark_cancelled();
        let order = order.clone();
        tracing::info!(order_id = %order_id, filled = %order.filled_quantity(), "Order cancelled");
        self.outbox.events.push(LedgerEvent::Order(order.clone()));

        if order.order_type() == OrderType::Bracket {
            if order.filled_quantity() > Decimal::ZERO {
                // The filled part of the entry still needs its exits.
                self.activate_children(&order, order.filled_quantity());
            } else {
                self.brackets.discard(order.id());
            }
        }

        Ok(true)
    }

    /// Mark an OPEN order as rejected, keeping the venue message verbatim.
    ///
    /// Returns `false` when the order has left OPEN.
    pub fn reject_order(
        &mut self,
        order_id: &OrderId,
        message: impl Into<String>,
    ) -> Result<bool, LedgerError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.clone()))?;

        if !OrderStateMachine::is_valid_transition(order.status(), OrderStatus::Rejected) {
            tracing::warn!(
                order_id = %order_id,
                status = %order.status(),
                "Ignoring rejection for order no longer open"
            );
            return Ok(false);
        }

        order.mark_rejected(message.into());
        let order = order.clone();
        tracing::warn!(
            order_id = %order_id,
            message = order.status_message().unwrap_or_default(),
            "Order rejected"
        );
        self.outbox.events.push(LedgerEvent::Order(order.clone()));

        if order.order_type() == OrderType::Bracket {
            self.brackets.discard(order.id());
        }

        Ok(true)
    }

    /// Record the venue's id for an order.
    ///
    /// Late acknowledgements for terminal orders are ignored. Returns
    /// whether the order changed.
    pub fn record_venue_id(
        &mut self,
        order_id: &OrderId,
        venue_order_id: impl Into<String>,
    ) -> Result<bool, LedgerError> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.clone()))?;

        if order.status().is_terminal() {
            tracing::debug!(
                order_id = %order_id,
                status = %order.status(),
                "Ignoring acknowledgement for closed order"
            );
            return Ok(false);
        }

        let venue_order_id = venue_order_id.into();
        if order.venue_order_id() == Some(venue_order_id.as_str()) {
            return Ok(false);
        }

        order.set_venue_order_id(venue_order_id);
        let order = order.clone();
        self.outbox.events.push(LedgerEvent::Order(order));
        Ok(true)
    }

    /// Dispatch a venue report to the matching command.
    ///
    /// Returns whether the ledger changed.
    pub fn apply_report(&mut self, report: ExecutionReport) -> Result<bool, LedgerError> {
        match report {
            ExecutionReport::Accepted {
                order_id,
                venue_order_id,
            } => self.record_venue_id(&order_id, venue_order_id),
            ExecutionReport::Fill {
                order_id,
                cumulative_quantity,
                price,
            } => self.apply_fill(&order_id, cumulative_quantity, price),
            ExecutionReport::Cancelled { order_id } => self.cancel_order(&order_id),
            ExecutionReport::Rejected { order_id, message } => {
                self.reject_order(&order_id, message)
            }
        }
    }

    /// Update the mark price for a symbol and re-publish affected positions.
    pub fn mark_price(&mut self, tick: &Tick) {
        self.marks.insert(tick.symbol.clone(), tick.price);

        for position in self
            .positions
            .values()
            .filter(|p| p.key().symbol == tick.symbol && !p.is_flat())
        {
            self.outbox
                .events
                .push(LedgerEvent::Position(position.snapshot(Some(tick.price))));
        }
    }

    /// Make sure a flat position exists for `symbol`.
    pub fn ensure_position(&mut self, symbol: &str) {
        let key = PositionKey::new(symbol, self.bot_name.clone());
        if self.positions.contains_key(&key) {
            return;
        }
        let position = Position::flat(key.clone());
        self.outbox
            .events
            .push(LedgerEvent::Position(position.snapshot(None)));
        self.positions.insert(key, position);
    }

    /// Drop all state and report what was held.
    pub fn teardown(&mut self) -> LedgerSummary {
        let summary = LedgerSummary {
            orders: self.orders.len(),
            open_orders: self.orders.values().filter(|o| o.is_open()).count(),
            trades: self.trades.len(),
            realized_pnl: self.positions.values().map(Position::realized_pnl).sum(),
        };

        self.orders.clear();
        self.sequence.clear();
        self.positions.clear();
        self.marks.clear();
        self.trades.clear();
        self.brackets = BracketBook::default();
        self.outbox = LedgerOutbox::default();

        summary
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Look up an order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// All orders in creation order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.sequence.iter().filter_map(|id| self.orders.get(id))
    }

    /// Orders still working, in creation order.
    #[must_use]
    pub fn open_orders(&self) -> Vec<Order> {
        self.orders().filter(|o| o.is_open()).cloned().collect()
    }

    /// Look up a position.
    #[must_use]
    pub fn position(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// Snapshots of every position, priced at the latest marks.
    #[must_use]
    pub fn positions(&self) -> Vec<PositionSnapshot> {
        self.positions
            .values()
            .map(|p| p.snapshot(self.marks.get(&p.key().symbol).copied()))
            .collect()
    }

    /// Trade history, oldest first.
    #[must_use]
    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    /// Latest mark for a symbol.
    #[must_use]
    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn insert(&mut self, order: Order) {
        self.outbox.events.push(LedgerEvent::Order(order.clone()));
        self.sequence.push(order.id().clone());
        self.orders.insert(order.id().clone(), order);
    }

    /// Apply one fill increment to the order's position and append the trade.
    fn update_position(&mut self, order: &Order, delta: Decimal, price: Decimal) {
        let key = PositionKey::new(order.symbol(), order.bot_name());
        let position = self
            .positions
            .entry(key.clone())
            .or_insert_with(|| Position::flat(key));

        let realized = position.apply_fill(order.side(), delta, price);
        let mark = self.marks.get(order.symbol()).copied().unwrap_or(price);
        let snapshot = position.snapshot(Some(mark));
        tracing::debug!(
            symbol = %snapshot.symbol,
            quantity = %snapshot.quantity,
            average_price = %snapshot.average_price,
            realized = %realized,
            "Position updated"
        );

        let trade = TradeRecord {
            order_id: order.id().clone(),
            symbol: order.symbol().to_string(),
            bot_name: order.bot_name().to_string(),
            side: order.side(),
            quantity: delta,
            price,
            realized_pnl: realized,
            timestamp: order.updated_at(),
        };

        self.outbox.events.push(LedgerEvent::Position(snapshot));
        self.outbox.events.push(LedgerEvent::Trade(trade.clone()));
        self.trades.push(trade);
    }

    fn cancel_sibling(&mut self, sibling_id: &OrderId) {
        let Some(sibling) = self.orders.get_mut(sibling_id) else {
            return;
        };
        if !sibling.status().is_cancelable() {
            return;
        }

        sibling.mark_cancelled();
        let sibling = sibling.clone();
        tracing::info!(order_id = %sibling_id, "Bracket sibling cancelled");
        self.outbox.events.push(LedgerEvent::Order(sibling.clone()));
        self.outbox.actions.push(VenueAction::Cancel(sibling));
    }

    fn activate_children(&mut self, parent: &Order, quantity: Decimal) {
        let Some(children) = self.brackets.activate(parent, quantity) else {
            return;
        };
        tracing::info!(
            parent_id = %parent.id(),
            take_profit_id = %children.take_profit.id(),
            stop_loss_id = %children.stop_loss.id(),
            quantity = %quantity,
            "Bracket children activated"
        );

        for child in [children.take_profit, children.stop_loss] {
            self.insert(child.clone());
            self.outbox.actions.push(VenueAction::Submit(child));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{BracketRole, OrderSide};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ledger() -> OrderLedger {
        OrderLedger::new("bot-crypto")
    }

    fn place(ledger: &mut OrderLedger, request: &OrderRequest) -> Order {
        ledger.place_order(request).unwrap().primary().clone()
    }

    fn bracket_request() -> OrderRequest {
        OrderRequest::bracket(
            "BTC/USD",
            OrderSide::Buy,
            dec!(2),
            dec!(100),
            dec!(110),
            dec!(95),
        )
    }

    fn children_of(outbox: &LedgerOutbox) -> Vec<Order> {
        outbox
            .actions
            .iter()
            .filter_map(|a| match a {
                VenueAction::Submit(o) => Some(o.clone()),
                VenueAction::Cancel(_) => None,
            })
            .collect()
    }

    #[test]
    fn place_order_records_open_order() {
        let mut ledger = ledger();
        let placement = ledger
            .place_order(&OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)))
            .unwrap();

        let Placement::Single(order) = placement else {
            panic!("expected single placement");
        };
        assert_eq!(order.status(), OrderStatus::Open);
        assert_eq!(order.bot_name(), "bot-crypto");
        assert_eq!(ledger.open_orders().len(), 1);

        let outbox = ledger.drain();
        assert_eq!(outbox.events, vec![LedgerEvent::Order(order)]);
        assert!(outbox.actions.is_empty());
    }

    #[test]
    fn place_order_rejects_invalid_request() {
        let mut ledger = ledger();
        let err = ledger
            .place_order(&OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(-1)))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrder(_)));
        assert!(ledger.drain().is_empty());
    }

    #[test]
    fn market_buy_then_sell_round_trip() {
        let mut ledger = ledger();
        let buy = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)),
        );
        assert!(ledger.apply_fill(buy.id(), dec!(1), dec!(69500)).unwrap());
        assert_eq!(ledger.order(buy.id()).unwrap().status(), OrderStatus::Filled);

        let key = PositionKey::new("BTC/USD", "bot-crypto");
        assert_eq!(ledger.position(&key).unwrap().quantity(), dec!(1));
        assert_eq!(ledger.position(&key).unwrap().average_price(), dec!(69500));

        let sell = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Sell, dec!(1)),
        );
        ledger.apply_fill(sell.id(), dec!(1), dec!(70000)).unwrap();

        let position = ledger.position(&key).unwrap();
        assert!(position.is_flat());
        assert_eq!(position.average_price(), Decimal::ZERO);
        assert_eq!(position.realized_pnl(), dec!(500));
        assert_eq!(ledger.trades().len(), 2);
    }

    #[test]
    fn fill_for_unknown_order_fails() {
        let mut ledger = ledger();
        let err = ledger
            .apply_fill(&OrderId::new("missing"), dec!(1), dec!(1))
            .unwrap_err();
        assert_eq!(err, LedgerError::UnknownOrder(OrderId::new("missing")));
    }

    #[test]
    fn replayed_fill_is_ignored() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(2), dec!(100)),
        );
        assert!(ledger.apply_fill(order.id(), dec!(1), dec!(100)).unwrap());
        ledger.drain();

        assert!(!ledger.apply_fill(order.id(), dec!(1), dec!(100)).unwrap());
        assert!(ledger.drain().is_empty());
        assert_eq!(ledger.trades().len(), 1);
    }

    #[test]
    fn over_fill_is_clamped() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)),
        );
        ledger.apply_fill(order.id(), dec!(3), dec!(100)).unwrap();

        let order = ledger.order(order.id()).unwrap();
        assert_eq!(order.filled_quantity(), dec!(1));
        assert_eq!(order.status(), OrderStatus::Filled);
    }

    #[test]
    fn terminal_orders_ignore_mutations() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)),
        );
        ledger.apply_fill(order.id(), dec!(1), dec!(100)).unwrap();

        assert!(!ledger.cancel_order(order.id()).unwrap());
        assert!(!ledger.reject_order(order.id(), "late").unwrap());
        assert!(!ledger.apply_fill(order.id(), dec!(2), dec!(100)).unwrap());
    }

    #[test]
    fn partially_filled_order_can_be_cancelled_not_rejected() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(2), dec!(100)),
        );
        ledger.apply_fill(order.id(), dec!(1), dec!(100)).unwrap();

        assert!(!ledger.reject_order(order.id(), "nope").unwrap());
        assert!(ledger.cancel_order(order.id()).unwrap());
        assert_eq!(
            ledger.order(order.id()).unwrap().status(),
            OrderStatus::Cancelled
        );
    }

    #[test]
    fn rejection_keeps_message_verbatim() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)),
        );
        ledger
            .reject_order(order.id(), "Account has insufficient balance.")
            .unwrap();

        let order = ledger.order(order.id()).unwrap();
        assert_eq!(order.status(), OrderStatus::Rejected);
        assert_eq!(
            order.status_message(),
            Some("Account has insufficient balance.")
        );
    }

    #[test]
    fn bracket_children_activate_when_parent_fills() {
        let mut ledger = ledger();
        let placement = ledger.place_order(&bracket_request()).unwrap();
        let Placement::Bracket { parent, children } = placement else {
            panic!("expected bracket placement");
        };
        assert!(children.is_none());
        ledger.drain();

        ledger.apply_fill(parent.id(), dec!(1), dec!(100)).unwrap();
        assert!(children_of(&ledger.drain()).is_empty());

        ledger.apply_fill(parent.id(), dec!(2), dec!(100)).unwrap();
        let outbox = ledger.drain();
        let children = children_of(&outbox);
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.quantity() == dec!(2)));
        assert!(children.iter().all(|c| c.side() == OrderSide::Sell));
        assert_eq!(ledger.open_orders().len(), 2);
    }

    #[test]
    fn bracket_child_fill_cancels_sibling_first() {
        let mut ledger = ledger();
        let parent = place(&mut ledger, &bracket_request());
        ledger.apply_fill(parent.id(), dec!(2), dec!(100)).unwrap();
        let children = children_of(&ledger.drain());

        let take_profit = children
            .iter()
            .find(|c| c.bracket().unwrap().role == BracketRole::TakeProfit)
            .unwrap();
        let stop_loss = children
            .iter()
            .find(|c| c.bracket().unwrap().role == BracketRole::StopLoss)
            .unwrap();

        ledger.apply_fill(take_profit.id(), dec!(2), dec!(110)).unwrap();
        let outbox = ledger.drain();

        let LedgerEvent::Order(first) = &outbox.events[0] else {
            panic!("expected child order event");
        };
        assert_eq!(first.id(), take_profit.id());
        let LedgerEvent::Order(second) = &outbox.events[1] else {
            panic!("expected sibling cancellation");
        };
        assert_eq!(second.id(), stop_loss.id());
        assert_eq!(second.status(), OrderStatus::Cancelled);
        assert!(matches!(outbox.events[2], LedgerEvent::Position(_)));
        assert_eq!(
            outbox.actions,
            vec![VenueAction::Cancel(second.clone())]
        );

        // The cancelled sibling can never fill afterwards.
        assert!(!ledger.apply_fill(stop_loss.id(), dec!(2), dec!(95)).unwrap());
        let key = PositionKey::new("BTC/USD", "bot-crypto");
        assert!(ledger.position(&key).unwrap().is_flat());
    }

    #[test]
    fn cancelling_unfilled_bracket_discards_children() {
        let mut ledger = ledger();
        let parent = place(&mut ledger, &bracket_request());
        ledger.drain();

        assert!(ledger.cancel_order(parent.id()).unwrap());
        assert!(children_of(&ledger.drain()).is_empty());
    }

    #[test]
    fn cancelling_partially_filled_bracket_sizes_children_to_fill() {
        let mut ledger = ledger();
        let parent = place(&mut ledger, &bracket_request());
        ledger.apply_fill(parent.id(), dec!(1), dec!(100)).unwrap();
        ledger.drain();

        ledger.cancel_order(parent.id()).unwrap();
        let children = children_of(&ledger.drain());
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.quantity() == dec!(1)));
    }

    #[test]
    fn mark_price_republishes_open_positions() {
        let mut ledger = ledger();
        ledger.ensure_position("ETH/USD");
        let order = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(2)),
        );
        ledger.apply_fill(order.id(), dec!(2), dec!(100)).unwrap();
        ledger.drain();

        ledger.mark_price(&Tick::new("BTC/USD", dec!(105), Utc::now()));
        ledger.mark_price(&Tick::new("ETH/USD", dec!(3000), Utc::now()));
        let outbox = ledger.drain();

        assert_eq!(outbox.events.len(), 1);
        let LedgerEvent::Position(snapshot) = &outbox.events[0] else {
            panic!("expected position event");
        };
        assert_eq!(snapshot.unrealized_pnl, dec!(10));
    }

    #[test]
    fn apply_report_dispatches() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(100)),
        );

        ledger
            .apply_report(ExecutionReport::Accepted {
                order_id: order.id().clone(),
                venue_order_id: "42".into(),
            })
            .unwrap();
        assert_eq!(ledger.order(order.id()).unwrap().venue_order_id(), Some("42"));

        assert!(ledger
            .apply_report(ExecutionReport::Cancelled {
                order_id: order.id().clone(),
            })
            .unwrap());
        assert!(ledger.open_orders().is_empty());
    }

    #[test]
    fn late_acknowledgement_for_cancelled_order_is_ignored() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(100)),
        );
        assert!(ledger.cancel_order(order.id()).unwrap());
        ledger.drain();

        let changed = ledger
            .apply_report(ExecutionReport::Accepted {
                order_id: order.id().clone(),
                venue_order_id: "v-9".into(),
            })
            .unwrap();

        assert!(!changed);
        assert!(ledger.drain().is_empty());
        let order = ledger.order(order.id()).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.venue_order_id(), None);
    }

    #[test]
    fn repeated_acknowledgement_is_not_republished() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(100)),
        );
        assert!(ledger.record_venue_id(order.id(), "42").unwrap());
        ledger.drain();

        assert!(!ledger.record_venue_id(order.id(), "42").unwrap());
        assert!(ledger.drain().is_empty());
    }

    #[test]
    fn teardown_summarizes_and_clears() {
        let mut ledger = ledger();
        let order = place(
            &mut ledger,
            &OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1)),
        );
        ledger.apply_fill(order.id(), dec!(1), dec!(100)).unwrap();
        place(
            &mut ledger,
            &OrderRequest::limit("BTC/USD", OrderSide::Sell, dec!(1), dec!(120)),
        );

        let summary = ledger.teardown();
        assert_eq!(summary.orders, 2);
        assert_eq!(summary.open_orders, 1);
        assert_eq!(summary.trades, 1);
        assert_eq!(ledger.orders().count(), 0);
        assert!(ledger.positions().is_empty());
    }
}
