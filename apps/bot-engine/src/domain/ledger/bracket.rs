//! Bracket bookkeeping.
//!
//! A bracket starts as a parent plus pending exit prices. When the parent
//! fills (or is cancelled after a partial fill) the exits become live child
//! orders and the pair is tracked until one of them fills.

use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::domain::order::{BracketRole, Order};
use crate::domain::shared::OrderId;

/// The two exit legs of an activated bracket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketChildren {
    /// LIMIT exit at the profit target.
    pub take_profit: Order,
    /// STOP exit at the protective stop.
    pub stop_loss: Order,
}

/// Exit prices held until the parent fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingExits {
    take_profit: Decimal,
    stop_loss: Decimal,
}

/// Ids of a live child pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActivePair {
    take_profit: OrderId,
    stop_loss: OrderId,
}

/// Pending and active brackets, keyed by parent id.
#[derive(Debug, Default)]
pub(crate) struct BracketBook {
    pending: HashMap<OrderId, PendingExits>,
    active: HashMap<OrderId, ActivePair>,
}

impl BracketBook {
    /// Register the exits of a freshly placed parent.
    pub(crate) fn register(&mut self, parent_id: OrderId, take_profit: Decimal, stop_loss: Decimal) {
        self.pending.insert(
            parent_id,
            PendingExits {
                take_profit,
                stop_loss,
            },
        );
    }

    /// Drop the pending exits of a parent that will never activate.
    pub(crate) fn discard(&mut self, parent_id: &OrderId) -> bool {
        self.pending.remove(parent_id).is_some()
    }

    /// Turn pending exits into live children sized to `quantity`.
    ///
    /// Returns `None` when the parent has no pending exits (already
    /// activated or discarded).
    pub(crate) fn activate(&mut self, parent: &Order, quantity: Decimal) -> Option<BracketChildren> {
        let exits = self.pending.remove(parent.id())?;
        let take_profit =
            Order::bracket_child(parent, BracketRole::TakeProfit, quantity, exits.take_profit);
        let stop_loss = Order::bracket_child(parent, BracketRole::StopLoss, quantity, exits.stop_loss);

        self.active.insert(
            parent.id().clone(),
            ActivePair {
                take_profit: take_profit.id().clone(),
                stop_loss: stop_loss.id().clone(),
            },
        );

        Some(BracketChildren {
            take_profit,
            stop_loss,
        })
    }

    /// Close the pair a filled child belongs to and return its sibling's id.
    ///
    /// Only the first fill of either child yields a sibling; later calls
    /// return `None`.
    pub(crate) fn resolve(&mut self, child: &Order) -> Option<OrderId> {
        let link = child.bracket()?;
        let sibling = match link.role {
            BracketRole::TakeProfit => {
                let pair = self.active.get(&link.parent_id)?;
                pair.stop_loss.clone()
            }
            BracketRole::StopLoss => {
                let pair = self.active.get(&link.parent_id)?;
                pair.take_profit.clone()
            }
            BracketRole::Parent => return None,
        };
        self.active.remove(&link.parent_id);
        Some(sibling)
    }

    /// Number of brackets still awaiting their parent.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of live child pairs.
    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }
}
