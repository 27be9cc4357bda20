//! Observer Store
//!
//! Local mirror of one engine's state, rebuilt from the observer stream.
//!
//! # Reconciliation rules
//!
//! - Every (re)connect puts the store in the awaiting-snapshot state; any
//!   delta received before the next `initial_state` is discarded.
//! - A snapshot replaces positions, open orders and bot statuses wholesale.
//!   Order history and the log ring survive reconnects.
//! - Deltas replace the entity they carry by key. An order reaching a
//!   terminal status leaves the open set and is appended to the history,
//!   once per order id.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use bot_engine::domain::bot::BotStatus;
use bot_engine::domain::log::SystemLog;
use bot_engine::domain::order::Order;
use bot_engine::domain::position::{PositionKey, PositionSnapshot};
use bot_engine::domain::sync::{StateSnapshot, SyncMessage};

use super::log_buffer::{DEFAULT_LOG_CAPACITY, LogBuffer};

/// Default number of terminal orders kept in the history.
pub const DEFAULT_ORDER_HISTORY_CAPACITY: usize = 200;

// =============================================================================
// Types
// =============================================================================

/// Link state of the observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Dialing the engine.
    Connecting,
    /// Socket open.
    Connected,
    /// No socket; a reconnect is scheduled.
    #[default]
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

/// What `ObserverStore::apply` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The message changed local state.
    Applied,
    /// The message arrived while awaiting a snapshot and was dropped.
    Discarded,
}

/// Counts for periodic status logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    /// Link state.
    pub status: ConnectionStatus,
    /// Known positions.
    pub positions: usize,
    /// Working orders.
    pub open_orders: usize,
    /// Known bots.
    pub bots: usize,
    /// Retained log lines.
    pub logs: usize,
    /// Sum of realized P&L over all positions.
    pub realized_pnl: Decimal,
    /// Sum of unrealized P&L over all positions.
    pub unrealized_pnl: Decimal,
}

// =============================================================================
// Store
// =============================================================================

/// Reconciled copy of the engine state.
#[derive(Debug)]
pub struct ObserverStore {
    status: ConnectionStatus,
    awaiting_snapshot: bool,
    positions: BTreeMap<PositionKey, PositionSnapshot>,
    open_orders: Vec<Order>,
    order_history: VecDeque<Order>,
    history_capacity: usize,
    bot_statuses: BTreeMap<String, BotStatus>,
    logs: LogBuffer,
    last_heartbeat: Option<DateTime<Utc>>,
    snapshots_received: u64,
}

impl Default for ObserverStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl ObserverStore {
    /// Empty, disconnected store with a log ring of `log_capacity` lines.
    #[must_use]
    pub fn new(log_capacity: usize) -> Self {
        Self::with_history_capacity(log_capacity, DEFAULT_ORDER_HISTORY_CAPACITY)
    }

    /// Like [`ObserverStore::new`] with an explicit order history bound.
    #[must_use]
    pub fn with_history_capacity(log_capacity: usize, history_capacity: usize) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            awaiting_snapshot: true,
            positions: BTreeMap::new(),
            open_orders: Vec::new(),
            order_history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
            bot_statuses: BTreeMap::new(),
            logs: LogBuffer::new(log_capacity),
            last_heartbeat: None,
            snapshots_received: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    /// A connection attempt started.
    pub fn set_connecting(&mut self) {
        self.status = ConnectionStatus::Connecting;
        self.awaiting_snapshot = true;
    }

    /// The socket opened; wait for a fresh snapshot.
    pub fn set_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.awaiting_snapshot = true;
    }

    /// The socket closed.
    pub fn set_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.awaiting_snapshot = true;
    }

    // -------------------------------------------------------------------------
    // Reconciliation
    // -------------------------------------------------------------------------

    /// Fold one protocol message into local state.
    pub fn apply(&mut self, message: SyncMessage) -> ApplyOutcome {
        if let SyncMessage::InitialState(snapshot) = message {
            self.replace(snapshot);
            return ApplyOutcome::Applied;
        }

        if self.awaiting_snapshot {
            tracing::debug!(
                event = message.event_name(),
                "Discarding delta received before snapshot"
            );
            return ApplyOutcome::Discarded;
        }

        match message {
            SyncMessage::InitialState(_) => {}
            SyncMessage::PositionUpdate(position) => {
                self.positions.insert(position.key(), position);
            }
            SyncMessage::OrderUpdate(order) => self.upsert_order(order),
            SyncMessage::BotStatusUpdate(status) => {
                self.bot_statuses.insert(status.name.clone(), status);
            }
            SyncMessage::LogMessage(line) => {
                self.logs.push(line);
            }
            SyncMessage::Heartbeat(heartbeat) => {
                self.last_heartbeat = Some(heartbeat.timestamp);
            }
        }
        ApplyOutcome::Applied
    }

    fn replace(&mut self, snapshot: StateSnapshot) {
        let StateSnapshot {
            positions,
            orders,
            bot_statuses,
        } = snapshot;

        self.positions = positions.into_iter().map(|p| (p.key(), p)).collect();
        self.open_orders.clear();
        for order in orders {
            self.upsert_order(order);
        }
        self.bot_statuses = bot_statuses;
        self.awaiting_snapshot = false;
        self.snapshots_received += 1;

        tracing::info!(
            positions = self.positions.len(),
            open_orders = self.open_orders.len(),
            bots = self.bot_statuses.len(),
            "Snapshot applied"
        );
    }

    fn upsert_order(&mut self, order: Order) {
        let existing = self.open_orders.iter().position(|o| o.id() == order.id());

        if order.status().is_terminal() {
            if let Some(index) = existing {
                self.open_orders.remove(index);
            }
            // Repeated terminal updates refresh the entry already recorded.
            if let Some(recorded) = self.order_history.iter_mut().find(|o| o.id() == order.id()) {
                *recorded = order;
                return;
            }
            if self.order_history.len() == self.history_capacity {
                self.order_history.pop_front();
            }
            self.order_history.push_back(order);
            return;
        }

        match existing {
            Some(index) => self.open_orders[index] = order,
            None => self.open_orders.push(order),
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Link state.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// True until a snapshot arrives on the current connection.
    #[must_use]
    pub const fn is_awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }

    /// Positions ordered by (symbol, bot).
    pub fn positions(&self) -> impl Iterator<Item = &PositionSnapshot> {
        self.positions.values()
    }

    /// One position.
    #[must_use]
    pub fn position(&self, key: &PositionKey) -> Option<&PositionSnapshot> {
        self.positions.get(key)
    }

    /// Working orders in arrival order.
    #[must_use]
    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }

    /// Terminal orders, oldest first.
    pub fn order_history(&self) -> impl DoubleEndedIterator<Item = &Order> {
        self.order_history.iter()
    }

    /// Bot statuses keyed by name.
    #[must_use]
    pub const fn bot_statuses(&self) -> &BTreeMap<String, BotStatus> {
        &self.bot_statuses
    }

    /// One bot status.
    #[must_use]
    pub fn bot_status(&self, name: &str) -> Option<&BotStatus> {
        self.bot_statuses.get(name)
    }

    /// System log ring.
    #[must_use]
    pub const fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// Timestamp of the last heartbeat.
    #[must_use]
    pub const fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Snapshots applied since construction.
    #[must_use]
    pub const fn snapshots_received(&self) -> u64 {
        self.snapshots_received
    }

    /// Counts and P&L totals.
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            status: self.status,
            positions: self.positions.len(),
            open_orders: self.open_orders.len(),
            bots: self.bot_statuses.len(),
            logs: self.logs.len(),
            realized_pnl: self.positions.values().map(|p| p.realized_pnl).sum(),
            unrealized_pnl: self.positions.values().map(|p| p.unrealized_pnl).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_engine::domain::bot::{BotState, StrategyDescriptor};
    use bot_engine::domain::log::LogLevel;
    use bot_engine::domain::order::{OrderRequest, OrderSide, OrderStatus};
    use bot_engine::domain::shared::OrderId;
    use bot_engine::domain::sync::Heartbeat;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, quantity: Decimal, realized: Decimal) -> PositionSnapshot {
        PositionSnapshot {
            symbol: symbol.to_string(),
            bot_name: "bot-crypto".to_string(),
            quantity,
            average_price: if quantity.is_zero() { dec!(0) } else { dec!(69500) },
            realized_pnl: realized,
            unrealized_pnl: dec!(0),
            mark_price: None,
            updated_at: Utc::now(),
        }
    }

    fn open_order(id: &str) -> Order {
        Order::new(
            OrderId::new(id),
            &OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(68000)),
            "bot-crypto",
        )
    }

    fn with_status(order: &Order, status: &str) -> Order {
        let mut value = serde_json::to_value(order).unwrap();
        value["status"] = serde_json::Value::String(status.to_string());
        serde_json::from_value(value).unwrap()
    }

    fn bot(state: BotState) -> BotStatus {
        BotStatus::new(
            "bot-crypto",
            state,
            StrategyDescriptor::new("Manual", "BTC/USD"),
        )
    }

    fn snapshot(positions: Vec<PositionSnapshot>, orders: Vec<Order>) -> SyncMessage {
        let mut bot_statuses = BTreeMap::new();
        bot_statuses.insert("bot-crypto".to_string(), bot(BotState::Running));
        SyncMessage::InitialState(StateSnapshot {
            positions,
            orders,
            bot_statuses,
        })
    }

    fn connected_store() -> ObserverStore {
        let mut store = ObserverStore::default();
        store.set_connecting();
        store.set_connected();
        store.apply(snapshot(vec![], vec![]));
        store
    }

    #[test]
    fn starts_disconnected_and_awaiting_snapshot() {
        let store = ObserverStore::default();

        assert_eq!(store.status(), ConnectionStatus::Disconnected);
        assert!(store.is_awaiting_snapshot());
        assert_eq!(store.snapshots_received(), 0);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut store = ObserverStore::default();

        store.set_connecting();
        assert_eq!(store.status(), ConnectionStatus::Connecting);
        store.set_connected();
        assert_eq!(store.status(), ConnectionStatus::Connected);
        store.set_disconnected();
        assert_eq!(store.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn snapshot_populates_state() {
        let mut store = ObserverStore::default();
        store.set_connected();

        let outcome = store.apply(snapshot(
            vec![
                position("BTC/USD", dec!(1), dec!(0)),
                position("ETH/USD", dec!(0), dec!(0)),
            ],
            vec![open_order("o-1")],
        ));

        assert_eq!(outcome, ApplyOutcome::Applied);
        assert!(!store.is_awaiting_snapshot());
        assert_eq!(store.positions().count(), 2);
        assert_eq!(store.open_orders().len(), 1);
        assert_eq!(
            store.bot_status("bot-crypto").unwrap().status,
            BotState::Running
        );
        assert_eq!(store.snapshots_received(), 1);
    }

    #[test]
    fn deltas_before_snapshot_are_discarded() {
        let mut store = ObserverStore::default();
        store.set_connected();

        let outcome = store.apply(SyncMessage::OrderUpdate(open_order("o-1")));

        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert!(store.open_orders().is_empty());
    }

    #[test]
    fn reconnect_discards_until_fresh_snapshot() {
        let mut store = connected_store();
        store.set_disconnected();
        store.set_connecting();
        store.set_connected();

        let outcome = store.apply(SyncMessage::PositionUpdate(position(
            "BTC/USD",
            dec!(3),
            dec!(0),
        )));

        assert_eq!(outcome, ApplyOutcome::Discarded);
        assert_eq!(store.positions().count(), 0);

        store.apply(snapshot(vec![position("BTC/USD", dec!(1), dec!(0))], vec![]));
        assert_eq!(store.snapshots_received(), 2);
        assert_eq!(store.positions().next().unwrap().quantity, dec!(1));
    }

    #[test]
    fn position_update_replaces_by_key() {
        let mut store = connected_store();

        store.apply(SyncMessage::PositionUpdate(position(
            "BTC/USD",
            dec!(1),
            dec!(0),
        )));
        store.apply(SyncMessage::PositionUpdate(position(
            "BTC/USD",
            dec!(0),
            dec!(500),
        )));

        let key = PositionKey::new("BTC/USD", "bot-crypto");
        let current = store.position(&key).unwrap();
        assert_eq!(current.quantity, dec!(0));
        assert_eq!(current.average_price, dec!(0));
        assert_eq!(current.realized_pnl, dec!(500));
        assert_eq!(store.positions().count(), 1);
    }

    #[test]
    fn order_update_replaces_open_order_in_place() {
        let mut store = connected_store();
        let first = open_order("o-1");
        let second = open_order("o-2");
        store.apply(SyncMessage::OrderUpdate(first.clone()));
        store.apply(SyncMessage::OrderUpdate(second));

        store.apply(SyncMessage::OrderUpdate(with_status(
            &first,
            "PARTIALLY_FILLED",
        )));

        let ids: Vec<_> = store.open_orders().iter().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["o-1", "o-2"]);
        assert_eq!(
            store.open_orders()[0].status(),
            OrderStatus::PartiallyFilled
        );
    }

    #[test]
    fn terminal_order_moves_to_history() {
        let mut store = connected_store();
        let order = open_order("o-1");
        store.apply(SyncMessage::OrderUpdate(order.clone()));

        store.apply(SyncMessage::OrderUpdate(with_status(&order, "CANCELLED")));

        assert!(store.open_orders().is_empty());
        let history: Vec<_> = store.order_history().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), OrderStatus::Cancelled);
    }

    #[test]
    fn repeated_terminal_update_is_recorded_once() {
        let mut store = connected_store();
        let order = open_order("o-1");
        store.apply(SyncMessage::OrderUpdate(order.clone()));

        let cancelled = with_status(&order, "CANCELLED");
        store.apply(SyncMessage::OrderUpdate(cancelled.clone()));
        store.apply(SyncMessage::OrderUpdate(cancelled));

        let history: Vec<_> = store.order_history().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id().as_str(), "o-1");
        assert_eq!(history[0].status(), OrderStatus::Cancelled);
    }

    #[test]
    fn order_history_is_bounded() {
        let mut store = ObserverStore::with_history_capacity(10, 2);
        store.set_connected();
        store.apply(snapshot(vec![], vec![]));

        for id in ["o-1", "o-2", "o-3"] {
            store.apply(SyncMessage::OrderUpdate(with_status(
                &open_order(id),
                "FILLED",
            )));
        }

        let ids: Vec<_> = store.order_history().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["o-2", "o-3"]);
    }

    #[test]
    fn snapshot_keeps_history_and_logs() {
        let mut store = connected_store();
        store.apply(SyncMessage::OrderUpdate(with_status(
            &open_order("o-1"),
            "FILLED",
        )));
        store.apply(SyncMessage::LogMessage(SystemLog::new(
            LogLevel::Trade,
            "bot-crypto",
            "BUY 1 BTC/USD @ 69500",
        )));

        store.set_disconnected();
        store.set_connected();
        store.apply(snapshot(vec![], vec![open_order("o-2")]));

        assert_eq!(store.order_history().count(), 1);
        assert_eq!(store.logs().len(), 1);
        assert_eq!(store.open_orders().len(), 1);
    }

    #[test]
    fn snapshot_replaces_stale_open_orders() {
        let mut store = connected_store();
        store.apply(SyncMessage::OrderUpdate(open_order("o-1")));

        store.set_connected();
        store.apply(snapshot(vec![], vec![open_order("o-2")]));

        let ids: Vec<_> = store.open_orders().iter().map(|o| o.id().as_str()).collect();
        assert_eq!(ids, vec!["o-2"]);
    }

    #[test]
    fn bot_status_update_replaces_by_name() {
        let mut store = connected_store();

        store.apply(SyncMessage::BotStatusUpdate(
            bot(BotState::Running).with_error("feed gave up"),
        ));

        let status = store.bot_status("bot-crypto").unwrap();
        assert_eq!(status.status, BotState::Error);
        assert_eq!(status.error.as_deref(), Some("feed gave up"));
        assert_eq!(store.bot_statuses().len(), 1);
    }

    #[test]
    fn log_ring_evicts_oldest() {
        let mut store = ObserverStore::new(2);
        store.set_connected();
        store.apply(snapshot(vec![], vec![]));

        for n in 1..=3 {
            store.apply(SyncMessage::LogMessage(SystemLog::new(
                LogLevel::Info,
                "bot-crypto",
                format!("line {n}"),
            )));
        }

        let lines: Vec<_> = store.logs().iter().map(|l| l.message.as_str()).collect();
        assert_eq!(lines, vec!["line 2", "line 3"]);
    }

    #[test]
    fn heartbeat_records_timestamp() {
        let mut store = connected_store();
        let heartbeat = Heartbeat::now("bot-engine");
        let at = heartbeat.timestamp;

        store.apply(SyncMessage::Heartbeat(heartbeat));

        assert_eq!(store.last_heartbeat(), Some(at));
    }

    #[test]
    fn summary_totals_pnl() {
        let mut store = ObserverStore::default();
        store.set_connected();
        store.apply(snapshot(
            vec![
                position("BTC/USD", dec!(0), dec!(500)),
                position("ETH/USD", dec!(0), dec!(-120)),
            ],
            vec![],
        ));

        let summary = store.summary();
        assert_eq!(summary.status, ConnectionStatus::Connected);
        assert_eq!(summary.positions, 2);
        assert_eq!(summary.bots, 1);
        assert_eq!(summary.realized_pnl, dec!(380));
        assert_eq!(summary.unrealized_pnl, dec!(0));
    }
}
