//! Binance broker adapter implementing the `Broker` port.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;

use crate::application::ports::{Broker, BrokerError};
use crate::domain::ledger::ExecutionReport;
use crate::domain::order::{Order, OrderRequest, OrderStatus, OrderType};
use crate::domain::position::{Position, PositionKey, PositionSnapshot};
use crate::domain::shared::OrderId;

use super::api_types::{AccountResponse, BinanceOrder, ServerTime, venue_order_type};
use super::config::{BinanceConfig, BinanceEnvironment};
use super::error::BinanceError;
use super::http_client::{BinanceHttpClient, Params};
use super::symbols;

/// Binance spot broker adapter (live or testnet).
#[derive(Debug, Clone)]
pub struct BinanceBroker {
    client: BinanceHttpClient,
    environment: BinanceEnvironment,
    bot_name: String,
}

impl BinanceBroker {
    /// Create a new adapter whose venue-side state is attributed to `bot_name`.
    pub fn new(config: &BinanceConfig, bot_name: impl Into<String>) -> Result<Self, BinanceError> {
        let client = BinanceHttpClient::new(config)?;
        Ok(Self {
            client,
            environment: config.environment,
            bot_name: bot_name.into(),
        })
    }

    /// Check if we're in live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.environment.is_live()
    }

    /// Query parameters for `POST /order`.
    fn order_params(order: &Order) -> Params {
        let order_type = order.order_type();
        let mut params: Params = vec![
            ("symbol", symbols::to_venue(order.symbol())),
            ("side", order.side().to_string()),
            ("type", venue_order_type(order_type).to_string()),
            ("quantity", order.quantity().normalize().to_string()),
            ("newClientOrderId", order.id().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];

        if matches!(
            order_type,
            OrderType::Limit | OrderType::StopLimit | OrderType::Bracket
        ) {
            params.push(("timeInForce", "GTC".to_string()));
            if let Some(price) = order.limit_price() {
                params.push(("price", price.normalize().to_string()));
            }
        }
        if matches!(order_type, OrderType::Stop | OrderType::StopLimit)
            && let Some(stop) = order.stop_price()
        {
            params.push(("stopPrice", stop.normalize().to_string()));
        }

        params
    }

    fn lookup_params(order: &Order) -> Params {
        vec![
            ("symbol", symbols::to_venue(order.symbol())),
            ("origClientOrderId", order.id().to_string()),
        ]
    }

    /// Rebuild a ledger-shaped order from the venue's copy.
    fn to_order(&self, venue: &BinanceOrder) -> Option<Order> {
        let side = venue.canonical_side()?;
        let request = OrderRequest {
            symbol: symbols::from_venue(&venue.symbol),
            side,
            order_type: venue.canonical_type(),
            quantity: venue.orig_qty,
            limit_price: venue.limit_price(),
            stop_price: venue.stop_price.filter(|p| *p > Decimal::ZERO),
            take_profit_price: None,
            stop_loss_price: None,
        };
        Some(
            Order::new(OrderId::new(&venue.client_order_id), &request, &self.bot_name)
                .with_venue_state(
                    venue.order_id.to_string(),
                    venue.executed_qty,
                    venue.average_fill_price(),
                    venue.canonical_status(),
                ),
        )
    }
}

/// Reports describing how the venue's copy differs from the ledger's.
///
/// Binance reports cumulative notional, so the price of the newly filled
/// quantity is derived from the notional the ledger has not seen yet.
pub(super) fn reports_for(order: &Order, venue: &BinanceOrder) -> Vec<ExecutionReport> {
    let mut reports = vec![ExecutionReport::Accepted {
        order_id: order.id().clone(),
        venue_order_id: venue.order_id.to_string(),
    }];

    let previous_qty = order.filled_quantity();
    if venue.executed_qty > previous_qty {
        let previous_notional = order.average_fill_price().unwrap_or_default() * previous_qty;
        let new_notional = venue.cummulative_quote_qty - previous_notional;
        let price = if new_notional > Decimal::ZERO {
            Some(new_notional / (venue.executed_qty - previous_qty))
        } else {
            venue.average_fill_price().or_else(|| venue.limit_price())
        };

        match price {
            Some(price) => reports.push(ExecutionReport::Fill {
                order_id: order.id().clone(),
                cumulative_quantity: venue.executed_qty,
                price,
            }),
            None => tracing::warn!(
                order_id = %order.id(),
                executed = %venue.executed_qty,
                "Fill reported without a usable price, skipping"
            ),
        }
    }

    match venue.canonical_status() {
        OrderStatus::Cancelled => reports.push(ExecutionReport::Cancelled {
            order_id: order.id().clone(),
        }),
        OrderStatus::Rejected => reports.push(ExecutionReport::Rejected {
            order_id: order.id().clone(),
            message: format!("Order {} by venue", venue.status),
        }),
        _ => {}
    }

    reports
}

#[async_trait]
impl Broker for BinanceBroker {
    fn name(&self) -> &str {
        match self.environment {
            BinanceEnvironment::Testnet => "binance-testnet",
            BinanceEnvironment::Live => "binance",
        }
    }

    async fn connect(&self) -> Result<(), BrokerError> {
        let time: ServerTime = self
            .client
            .get_public("/time")
            .await
            .map_err(|e| BrokerError::ConnectionError {
                message: e.to_string(),
            })?;

        tracing::info!(
            environment = %self.environment,
            server_time = time.server_time,
            "Connected to Binance"
        );
        Ok(())
    }

    async fn place_order(
        &self,
        order: &Order,
        _reference_price: Option<Decimal>,
    ) -> Result<Vec<ExecutionReport>, BrokerError> {
        if self.is_live() {
            tracing::warn!(
                order_id = %order.id(),
                symbol = order.symbol(),
                "Submitting LIVE order - this will execute real trades"
            );
        }

        let params = Self::order_params(order);
        tracing::info!(
            order_id = %order.id(),
            symbol = order.symbol(),
            side = %order.side(),
            order_type = %order.order_type(),
            quantity = %order.quantity(),
            price = ?order.limit_price(),
            "Submitting order to Binance"
        );

        let response: BinanceOrder = self
            .client
            .signed(Method::POST, "/order", &params)
            .await
            .map_err(BrokerError::from)?;

        tracing::info!(
            order_id = %order.id(),
            venue_order_id = response.order_id,
            status = %response.status,
            "Order submitted successfully"
        );

        Ok(reports_for(order, &response))
    }

    async fn cancel_order(&self, order: &Order) -> Result<bool, BrokerError> {
        tracing::info!(order_id = %order.id(), "Canceling order by client ID");

        match self
            .client
            .signed::<BinanceOrder>(Method::DELETE, "/order", &Self::lookup_params(order))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_unknown_order() => {
                tracing::info!(order_id = %order.id(), error = %err, "Order no longer cancelable");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let account: AccountResponse = self
            .client
            .signed(Method::GET, "/account", &[])
            .await
            .map_err(BrokerError::from)?;

        Ok(account
            .balances
            .iter()
            .filter(|b| b.total() > Decimal::ZERO)
            .map(|b| {
                Position::from_holdings(
                    PositionKey::new(&b.asset, &self.bot_name),
                    b.total(),
                    Decimal::ZERO,
                )
                .snapshot(None)
            })
            .collect())
    }

    async fn get_open_orders(&self) -> Result<Vec<Order>, BrokerError> {
        let orders: Vec<BinanceOrder> = self
            .client
            .signed(Method::GET, "/openOrders", &[])
            .await
            .map_err(BrokerError::from)?;

        Ok(orders
            .iter()
            .filter_map(|venue| {
                let order = self.to_order(venue);
                if order.is_none() {
                    tracing::warn!(side = %venue.side, order_id = venue.order_id, "Skipping order with unknown side");
                }
                order
            })
            .collect())
    }

    async fn poll_executions(
        &self,
        open_orders: &[Order],
    ) -> Result<Vec<ExecutionReport>, BrokerError> {
        let mut reports = Vec::new();
        for order in open_orders {
            match self
                .client
                .signed::<BinanceOrder>(Method::GET, "/order", &Self::lookup_params(order))
                .await
            {
                Ok(venue) => reports.extend(reports_for(order, &venue)),
                Err(err) if err.is_unknown_order() => {
                    tracing::debug!(order_id = %order.id(), "Order not yet known to Binance");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderSide;
    use rust_decimal_macros::dec;

    fn venue_order(executed: Decimal, quote: Decimal, status: &str) -> BinanceOrder {
        BinanceOrder {
            symbol: "BTCUSDT".into(),
            order_id: 42,
            client_order_id: "o-1".into(),
            price: dec!(69000),
            orig_qty: dec!(2),
            executed_qty: executed,
            cummulative_quote_qty: quote,
            status: status.into(),
            order_type: "LIMIT".into(),
            side: "BUY".into(),
            stop_price: None,
        }
    }

    fn ledger_order() -> Order {
        let request = OrderRequest::limit("BTC-USDT", OrderSide::Buy, dec!(2), dec!(69000));
        Order::new(OrderId::new("o-1"), &request, "bot")
    }

    fn param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn limit_order_params() {
        let params = BinanceBroker::order_params(&ledger_order());
        assert_eq!(param(&params, "symbol"), Some("BTCUSDT"));
        assert_eq!(param(&params, "side"), Some("BUY"));
        assert_eq!(param(&params, "type"), Some("LIMIT"));
        assert_eq!(param(&params, "timeInForce"), Some("GTC"));
        assert_eq!(param(&params, "price"), Some("69000"));
        assert_eq!(param(&params, "newClientOrderId"), Some("o-1"));
        assert_eq!(param(&params, "stopPrice"), None);
    }

    #[test]
    fn market_order_has_no_price() {
        let request = OrderRequest::market("BTC-USDT", OrderSide::Sell, dec!(0.5));
        let order = Order::new(OrderId::new("o-2"), &request, "bot");
        let params = BinanceBroker::order_params(&order);
        assert_eq!(param(&params, "type"), Some("MARKET"));
        assert_eq!(param(&params, "quantity"), Some("0.5"));
        assert_eq!(param(&params, "price"), None);
        assert_eq!(param(&params, "timeInForce"), None);
    }

    #[test]
    fn stop_order_uses_stop_loss() {
        let request = OrderRequest::stop("BTC-USDT", OrderSide::Sell, dec!(1), dec!(65000));
        let order = Order::new(OrderId::new("o-3"), &request, "bot");
        let params = BinanceBroker::order_params(&order);
        assert_eq!(param(&params, "type"), Some("STOP_LOSS"));
        assert_eq!(param(&params, "stopPrice"), Some("65000"));
    }

    #[test]
    fn new_order_reports_acceptance_only() {
        let reports = reports_for(&ledger_order(), &venue_order(dec!(0), dec!(0), "NEW"));
        assert_eq!(
            reports,
            vec![ExecutionReport::Accepted {
                order_id: OrderId::new("o-1"),
                venue_order_id: "42".into(),
            }]
        );
    }

    #[test]
    fn fill_price_is_incremental() {
        let mut order = ledger_order();
        order.record_fill(dec!(1), dec!(100));

        // 1 @ 100 already known, venue now reports 2 for 310 total notional.
        let reports = reports_for(&order, &venue_order(dec!(2), dec!(310), "FILLED"));
        assert!(reports.contains(&ExecutionReport::Fill {
            order_id: OrderId::new("o-1"),
            cumulative_quantity: dec!(2),
            price: dec!(210),
        }));
    }

    #[test]
    fn cancelled_with_partial_fill_reports_both() {
        let reports = reports_for(&ledger_order(), &venue_order(dec!(1), dec!(69000), "CANCELED"));
        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[1], ExecutionReport::Fill { price, .. } if price == dec!(69000)));
        assert!(matches!(reports[2], ExecutionReport::Cancelled { .. }));
    }

    #[test]
    fn rejected_status_reports_rejection() {
        let reports = reports_for(&ledger_order(), &venue_order(dec!(0), dec!(0), "REJECTED"));
        assert!(matches!(
            &reports[1],
            ExecutionReport::Rejected { message, .. } if message == "Order REJECTED by venue"
        ));
    }

    #[test]
    fn venue_order_converts_to_ledger_shape() {
        let config = BinanceConfig::new("k".into(), "s".into(), BinanceEnvironment::Testnet);
        let broker = BinanceBroker::new(&config, "bot-crypto").unwrap();
        let order = broker
            .to_order(&venue_order(dec!(1), dec!(69000), "PARTIALLY_FILLED"))
            .unwrap();

        assert_eq!(order.symbol(), "BTC-USDT");
        assert_eq!(order.id().as_str(), "o-1");
        assert_eq!(order.venue_order_id(), Some("42"));
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);
        assert_eq!(order.average_fill_price(), Some(dec!(69000)));
        assert_eq!(order.bot_name(), "bot-crypto");
        assert_eq!(broker.name(), "binance-testnet");
    }
}
