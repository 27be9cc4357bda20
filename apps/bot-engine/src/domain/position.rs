//! Position accounting and trade history.
//!
//! A position is keyed by (symbol, bot). Quantity is signed: positive is
//! long, negative is short. The average entry price follows the
//! weighted-cost rule on exposure increases, stays put on reductions and
//! resets to the fill price when a fill flips the sign.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::order::OrderSide;
use crate::domain::shared::OrderId;

/// Identity of a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    /// Instrument symbol.
    pub symbol: String,
    /// Owning bot.
    pub bot_name: String,
}

impl PositionKey {
    /// Create a key.
    #[must_use]
    pub fn new(symbol: impl Into<String>, bot_name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bot_name: bot_name.into(),
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.bot_name)
    }
}

/// Net holding in one symbol for one bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    key: PositionKey,
    quantity: Decimal,
    average_price: Decimal,
    realized_pnl: Decimal,
    updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a flat position.
    #[must_use]
    pub fn flat(key: PositionKey) -> Self {
        Self {
            key,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// Create a position from venue-reported holdings.
    #[must_use]
    pub fn from_holdings(key: PositionKey, quantity: Decimal, average_price: Decimal) -> Self {
        let average_price = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            average_price.abs()
        };
        Self {
            quantity,
            average_price,
            ..Self::flat(key)
        }
    }

    /// Apply a fill of `quantity` (unsigned) on `side` at `price`.
    ///
    /// Returns the P&L realized by this fill.
    pub fn apply_fill(&mut self, side: OrderSide, quantity: Decimal, price: Decimal) -> Decimal {
        let delta = side.sign() * quantity;
        let old = self.quantity;
        let new = old + delta;
        let mut realized = Decimal::ZERO;

        if old.is_zero() || old.is_sign_positive() == delta.is_sign_positive() {
            // Opening or adding in the same direction.
            self.average_price = (old.abs() * self.average_price + quantity * price) / new.abs();
        } else {
            let closed = quantity.min(old.abs());
            let direction = if old.is_sign_negative() {
                Decimal::NEGATIVE_ONE
            } else {
                Decimal::ONE
            };
            realized = closed * (price - self.average_price) * direction;

            if new.is_zero() {
                self.average_price = Decimal::ZERO;
            } else if new.is_sign_positive() != old.is_sign_positive() {
                // Flipped through zero: the remainder opens at the fill price.
                self.average_price = price;
            }
        }

        self.quantity = new;
        self.realized_pnl += realized;
        self.updated_at = Utc::now();
        realized
    }

    /// Identity.
    #[must_use]
    pub const fn key(&self) -> &PositionKey {
        &self.key
    }

    /// Signed quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Average entry price (0 when flat).
    #[must_use]
    pub const fn average_price(&self) -> Decimal {
        self.average_price
    }

    /// Cumulative realized P&L.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Returns true when the position holds nothing.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Unrealized P&L against a mark price.
    #[must_use]
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        if self.is_flat() {
            return Decimal::ZERO;
        }
        self.quantity * (mark - self.average_price)
    }

    /// Produce the wire view, pricing unrealized P&L against `mark`.
    #[must_use]
    pub fn snapshot(&self, mark: Option<Decimal>) -> PositionSnapshot {
        PositionSnapshot {
            symbol: self.key.symbol.clone(),
            bot_name: self.key.bot_name.clone(),
            quantity: self.quantity,
            average_price: self.average_price,
            realized_pnl: self.realized_pnl,
            unrealized_pnl: mark.map_or(Decimal::ZERO, |m| self.unrealized_pnl(m)),
            mark_price: mark,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time view of a position, as sent to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSnapshot {
    /// Instrument symbol.
    pub symbol: String,
    /// Owning bot.
    #[serde(default)]
    pub bot_name: String,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Average entry price.
    pub average_price: Decimal,
    /// Cumulative realized P&L.
    #[serde(default)]
    pub realized_pnl: Decimal,
    /// Unrealized P&L at the mark price.
    #[serde(default)]
    pub unrealized_pnl: Decimal,
    /// Mark price used for unrealized P&L.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_price: Option<Decimal>,
    /// Last change.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl PositionSnapshot {
    /// Identity of the snapshotted position.
    #[must_use]
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.bot_name.clone())
    }
}

/// One applied fill, appended to the ledger's trade history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    /// Order the fill belongs to.
    pub order_id: OrderId,
    /// Instrument symbol.
    pub symbol: String,
    /// Owning bot.
    pub bot_name: String,
    /// Fill side.
    pub side: OrderSide,
    /// Incremental quantity of this fill.
    pub quantity: Decimal,
    /// Fill price.
    pub price: Decimal,
    /// P&L realized by this fill.
    pub realized_pnl: Decimal,
    /// When the fill was applied.
    pub timestamp: DateTime<Utc>,
}
