//! Order State Machine
//!
//! `OPEN → {PARTIALLY_FILLED → FILLED, CANCELLED, REJECTED}` with
//! `OPEN → FILLED` and `PARTIALLY_FILLED → CANCELLED` permitted.

use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            (OrderStatus::Open, OrderStatus::PartiallyFilled)
                | (OrderStatus::Open, OrderStatus::Filled)
                | (OrderStatus::Open, OrderStatus::Cancelled)
                | (OrderStatus::Open, OrderStatus::Rejected)
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Cancelled)
        )
    }

    /// Status implied by a cumulative filled quantity.
    #[must_use]
    pub fn status_for_fill(filled: Decimal, requested: Decimal) -> OrderStatus {
        if filled >= requested {
            OrderStatus::Filled
        } else if filled > Decimal::ZERO {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Open => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
                OrderStatus::Rejected,
            ],
            OrderStatus::PartiallyFilled => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Cancelled,
            ],
            // Terminal states
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected => vec![],
        }
    }
}
