//! Binance spot REST request and response types.
//!
//! These types map directly to Binance's JSON format; numeric fields arrive
//! as strings.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::order::{OrderSide, OrderStatus, OrderType};

// ============================================================================
// Error / Misc
// ============================================================================

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceErrorResponse {
    /// Negative error code.
    pub code: i64,
    /// Human readable message.
    pub msg: String,
}

/// `GET /time` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerTime {
    /// Server time in epoch milliseconds.
    pub server_time: i64,
}

// ============================================================================
// Order Types
// ============================================================================

/// Order as returned by `POST /order` (RESULT), `GET /order` and
/// `GET /openOrders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceOrder {
    /// Venue symbol (`BTCUSDT`).
    pub symbol: String,
    /// Venue order id.
    pub order_id: u64,
    /// Client order id (the ledger order id).
    pub client_order_id: String,
    /// Limit price, `"0.00000000"` for market orders.
    #[serde(default)]
    pub price: Decimal,
    /// Requested quantity.
    pub orig_qty: Decimal,
    /// Filled quantity.
    pub executed_qty: Decimal,
    /// Filled notional.
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    /// Venue status.
    pub status: String,
    /// Venue order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// `BUY` or `SELL`.
    pub side: String,
    /// Trigger price for stop orders.
    #[serde(default)]
    pub stop_price: Option<Decimal>,
}

impl BinanceOrder {
    /// Canonical status.
    #[must_use]
    pub fn canonical_status(&self) -> OrderStatus {
        parse_order_status(&self.status)
    }

    /// Volume-weighted fill price over everything executed so far.
    #[must_use]
    pub fn average_fill_price(&self) -> Option<Decimal> {
        (self.executed_qty > Decimal::ZERO && self.cummulative_quote_qty > Decimal::ZERO)
            .then(|| self.cummulative_quote_qty / self.executed_qty)
    }

    /// Canonical side; `None` for an unexpected value.
    #[must_use]
    pub fn canonical_side(&self) -> Option<OrderSide> {
        match self.side.as_str() {
            "BUY" => Some(OrderSide::Buy),
            "SELL" => Some(OrderSide::Sell),
            _ => None,
        }
    }

    /// Canonical type; unknown venue types read as LIMIT.
    #[must_use]
    pub fn canonical_type(&self) -> OrderType {
        match self.order_type.as_str() {
            "MARKET" => OrderType::Market,
            "STOP_LOSS" | "TAKE_PROFIT" => OrderType::Stop,
            "STOP_LOSS_LIMIT" | "TAKE_PROFIT_LIMIT" => OrderType::StopLimit,
            _ => OrderType::Limit,
        }
    }

    /// Price as an option (`0` means none).
    #[must_use]
    pub fn limit_price(&self) -> Option<Decimal> {
        (self.price > Decimal::ZERO).then_some(self.price)
    }
}

// ============================================================================
// Account Types
// ============================================================================

/// `GET /account` response (only the fields used).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    /// Per-asset balances.
    pub balances: Vec<Balance>,
}

/// One asset balance.
#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    /// Asset code.
    pub asset: String,
    /// Available amount.
    pub free: Decimal,
    /// Amount locked in orders.
    pub locked: Decimal,
}

impl Balance {
    /// Free plus locked.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Map a Binance order status onto the canonical statuses.
///
/// Unknown statuses read as OPEN and are logged.
#[must_use]
pub fn parse_order_status(status: &str) -> OrderStatus {
    match status {
        "NEW" | "PENDING_NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Rejected,
        other => {
            tracing::warn!(status = other, "Unmapped Binance order status, treating as OPEN");
            OrderStatus::Open
        }
    }
}

/// Venue order type and parameters for a canonical order type.
///
/// Bracket parents go out as LIMIT at the entry price; their exits are
/// separate orders submitted after the entry fills.
#[must_use]
pub const fn venue_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit | OrderType::Bracket => "LIMIT",
        OrderType::Stop => "STOP_LOSS",
        OrderType::StopLimit => "STOP_LOSS_LIMIT",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test_case("NEW", OrderStatus::Open)]
    #[test_case("PENDING_NEW", OrderStatus::Open)]
    #[test_case("PARTIALLY_FILLED", OrderStatus::PartiallyFilled)]
    #[test_case("FILLED", OrderStatus::Filled)]
    #[test_case("CANCELED", OrderStatus::Cancelled)]
    #[test_case("EXPIRED", OrderStatus::Cancelled)]
    #[test_case("EXPIRED_IN_MATCH", OrderStatus::Cancelled)]
    #[test_case("REJECTED", OrderStatus::Rejected)]
    #[test_case("SOMETHING_NEW", OrderStatus::Open)]
    fn status_mapping(venue: &str, expected: OrderStatus) {
        assert_eq!(parse_order_status(venue), expected);
    }

    #[test_case(OrderType::Market, "MARKET")]
    #[test_case(OrderType::Limit, "LIMIT")]
    #[test_case(OrderType::Stop, "STOP_LOSS")]
    #[test_case(OrderType::StopLimit, "STOP_LOSS_LIMIT")]
    #[test_case(OrderType::Bracket, "LIMIT")]
    fn order_type_mapping(order_type: OrderType, expected: &str) {
        assert_eq!(venue_order_type(order_type), expected);
    }

    #[test]
    fn parse_order_response() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "orderId": 28,
            "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP",
            "transactTime": 1507725176595,
            "price": "0.00000000",
            "origQty": "10.00000000",
            "executedQty": "10.00000000",
            "cummulativeQuoteQty": "10.00000000",
            "status": "FILLED",
            "timeInForce": "GTC",
            "type": "MARKET",
            "side": "SELL"
        }"#;
        let order: BinanceOrder = serde_json::from_str(json).unwrap();

        assert_eq!(order.order_id, 28);
        assert_eq!(order.executed_qty, dec!(10));
        assert_eq!(order.canonical_status(), OrderStatus::Filled);
        assert_eq!(order.canonical_side(), Some(OrderSide::Sell));
        assert_eq!(order.canonical_type(), OrderType::Market);
        assert_eq!(order.average_fill_price(), Some(dec!(1)));
        assert_eq!(order.limit_price(), None);
    }

    #[test]
    fn unfilled_order_has_no_average() {
        let json = r#"{
            "symbol": "BTCUSDT", "orderId": 1, "clientOrderId": "c",
            "price": "69000.00", "origQty": "1.0", "executedQty": "0.0",
            "cummulativeQuoteQty": "0.0", "status": "NEW",
            "type": "LIMIT", "side": "BUY"
        }"#;
        let order: BinanceOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.average_fill_price(), None);
        assert_eq!(order.limit_price(), Some(dec!(69000)));
    }

    #[test]
    fn parse_account_balances() {
        let json = r#"{
            "makerCommission": 15,
            "balances": [
                {"asset": "BTC", "free": "0.5", "locked": "0.25"},
                {"asset": "LTC", "free": "0.0", "locked": "0.0"}
            ]
        }"#;
        let account: AccountResponse = serde_json::from_str(json).unwrap();
        assert_eq!(account.balances[0].total(), dec!(0.75));
        assert_eq!(account.balances[1].total(), Decimal::ZERO);
    }
}
