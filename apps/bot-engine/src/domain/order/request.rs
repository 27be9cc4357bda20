//! Order placement request and its validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderSide, OrderType};

/// Validation failures for an [`OrderRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderValidationError {
    /// Symbol is blank.
    #[error("symbol must not be empty")]
    EmptySymbol,

    /// Quantity is zero or negative.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Limit price missing for a type that needs one.
    #[error("{0} order requires a limit price")]
    MissingLimitPrice(OrderType),

    /// Stop price missing for a type that needs one.
    #[error("{0} order requires a stop price")]
    MissingStopPrice(OrderType),

    /// A price is zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositivePrice {
        /// Which price field.
        field: &'static str,
        /// The offending value.
        value: Decimal,
    },

    /// Bracket is missing one of its exit legs.
    #[error("bracket order requires a {0} price")]
    MissingBracketLeg(&'static str),

    /// A bracket exit sits on the wrong side of the entry.
    #[error("{leg} price {price} is on the wrong side of entry {entry} for a {side} bracket")]
    BracketLegWrongSide {
        /// Which leg.
        leg: &'static str,
        /// Leg price.
        price: Decimal,
        /// Entry price.
        entry: Decimal,
        /// Entry side.
        side: OrderSide,
    },
}

/// Parameters for placing an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Instrument symbol in canonical form (e.g. `BTC/USD`, `BTC-USDT`).
    pub symbol: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Limit price (entry price for brackets).
    #[serde(rename = "price", default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Stop trigger price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Bracket profit target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Decimal>,
    /// Bracket protective stop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<Decimal>,
}

impl OrderRequest {
    /// Create a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            take_profit_price: None,
            stop_loss_price: None,
        }
    }

    /// Create a limit order request.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Create a stop order request.
    #[must_use]
    pub fn stop(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            stop_price: Some(stop_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Create a bracket order request: limit entry plus take-profit and stop-loss exits.
    #[must_use]
    pub fn bracket(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        entry_price: Decimal,
        take_profit_price: Decimal,
        stop_loss_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Bracket,
            limit_price: Some(entry_price),
            take_profit_price: Some(take_profit_price),
            stop_loss_price: Some(stop_loss_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns the first rule the request breaks.
    pub fn validate(&self) -> Result<(), OrderValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(OrderValidationError::EmptySymbol);
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderValidationError::NonPositiveQuantity(self.quantity));
        }

        if self.order_type.requires_limit_price() && self.limit_price.is_none() {
            return Err(OrderValidationError::MissingLimitPrice(self.order_type));
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(OrderValidationError::MissingStopPrice(self.order_type));
        }

        for (field, value) in [
            ("limit price", self.limit_price),
            ("stop price", self.stop_price),
            ("take-profit price", self.take_profit_price),
            ("stop-loss price", self.stop_loss_price),
        ] {
            if let Some(value) = value
                && value <= Decimal::ZERO
            {
                return Err(OrderValidationError::NonPositivePrice { field, value });
            }
        }

        if self.order_type == OrderType::Bracket {
            self.validate_bracket_legs()?;
        }

        Ok(())
    }

    fn validate_bracket_legs(&self) -> Result<(), OrderValidationError> {
        let entry = self
            .limit_price
            .ok_or(OrderValidationError::MissingLimitPrice(OrderType::Bracket))?;
        let take_profit = self
            .take_profit_price
            .ok_or(OrderValidationError::MissingBracketLeg("take-profit"))?;
        let stop_loss = self
            .stop_loss_price
            .ok_or(OrderValidationError::MissingBracketLeg("stop-loss"))?;

        // Profit target beyond the entry, protective stop behind it.
        let (tp_ok, sl_ok) = match self.side {
            OrderSide::Buy => (take_profit > entry, stop_loss < entry),
            OrderSide::Sell => (take_profit < entry, stop_loss > entry),
        };

        if !tp_ok {
            return Err(OrderValidationError::BracketLegWrongSide {
                leg: "take-profit",
                price: take_profit,
                entry,
                side: self.side,
            });
        }
        if !sl_ok {
            return Err(OrderValidationError::BracketLegWrongSide {
                leg: "stop-loss",
                price: stop_loss,
                entry,
                side: self.side,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn market_request_is_valid() {
        let request = OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(1));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_quantity() {
        let request = OrderRequest::market("BTC/USD", OrderSide::Buy, dec!(0));
        assert_eq!(
            request.validate(),
            Err(OrderValidationError::NonPositiveQuantity(dec!(0)))
        );
    }

    #[test]
    fn rejects_blank_symbol() {
        let request = OrderRequest::market("  ", OrderSide::Buy, dec!(1));
        assert_eq!(request.validate(), Err(OrderValidationError::EmptySymbol));
    }

    #[test]
    fn limit_without_price_is_invalid() {
        let mut request = OrderRequest::limit("BTC/USD", OrderSide::Buy, dec!(1), dec!(100));
        request.limit_price = None;
        assert_eq!(
            request.validate(),
            Err(OrderValidationError::MissingLimitPrice(OrderType::Limit))
        );
    }

    #[test]
    fn stop_limit_needs_both_prices() {
        let request = OrderRequest {
            order_type: OrderType::StopLimit,
            limit_price: Some(dec!(100)),
            ..OrderRequest::market("BTC/USD", OrderSide::Sell, dec!(1))
        };
        assert_eq!(
            request.validate(),
            Err(OrderValidationError::MissingStopPrice(OrderType::StopLimit))
        );
    }

    #[test]
    fn buy_bracket_legs_must_straddle_entry() {
        let ok = OrderRequest::bracket(
            "BTC/USD",
            OrderSide::Buy,
            dec!(1),
            dec!(100),
            dec!(110),
            dec!(95),
        );
        assert!(ok.validate().is_ok());

        let inverted = OrderRequest::bracket(
            "BTC/USD",
            OrderSide::Buy,
            dec!(1),
            dec!(100),
            dec!(95),
            dec!(90),
        );
        assert!(matches!(
            inverted.validate(),
            Err(OrderValidationError::BracketLegWrongSide {
                leg: "take-profit",
                ..
            })
        ));
    }

    #[test]
    fn sell_bracket_legs_are_mirrored() {
        let ok = OrderRequest::bracket(
            "BTC/USD",
            OrderSide::Sell,
            dec!(1),
            dec!(100),
            dec!(90),
            dec!(105),
        );
        assert!(ok.validate().is_ok());

        let bad_stop = OrderRequest::bracket(
            "BTC/USD",
            OrderSide::Sell,
            dec!(1),
            dec!(100),
            dec!(90),
            dec!(99),
        );
        assert!(matches!(
            bad_stop.validate(),
            Err(OrderValidationError::BracketLegWrongSide {
                leg: "stop-loss",
                ..
            })
        ));
    }

    #[test]
    fn request_accepts_wire_field_names() {
        let json = r#"{"symbol":"BTC/USD","side":"BUY","type":"LIMIT","quantity":"1","price":"69000"}"#;
        let request: OrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.limit_price, Some(dec!(69000)));
    }
}
