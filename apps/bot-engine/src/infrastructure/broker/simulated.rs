//! Simulated broker.
//!
//! Matches orders locally against the ticks the session forwards through
//! [`Broker::match_tick`]:
//!
//! - MARKET fills at once at the caller's reference price (rejected without one)
//! - LIMIT and bracket entries rest until a tick trades through the limit,
//!   then fill at the limit price
//! - STOP triggers when a tick crosses the stop and fills at the tick price
//! - STOP_LIMIT arms at the stop, then rests as a limit
//!
//! Bracket exits sharing a parent form an OCO group: once one fills, the
//! other is withdrawn in the same pass.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{Broker, BrokerError};
use crate::domain::ledger::ExecutionReport;
use crate::domain::market::Tick;
use crate::domain::order::{BracketRole, Order, OrderSide, OrderType};
use crate::domain::position::{Position, PositionKey, PositionSnapshot};
use crate::domain::shared::OrderId;

/// An order working at the simulated venue.
#[derive(Debug, Clone)]
struct RestingOrder {
    order: Order,
    armed: bool,
}

impl RestingOrder {
    const fn new(order: Order) -> Self {
        Self {
            order,
            armed: false,
        }
    }

    /// OCO group of a bracket exit.
    fn oco_group(&self) -> Option<&OrderId> {
        self.order
            .bracket()
            .filter(|link| link.role != BracketRole::Parent)
            .map(|link| &link.parent_id)
    }

    /// Price this order executes at for a trade at `price`, if any.
    fn execution_price(&mut self, price: Decimal) -> Option<Decimal> {
        let side = self.order.side();
        match self.order.order_type() {
            OrderType::Market => Some(price),
            OrderType::Limit | OrderType::Bracket => limit_execution(side, self.order.limit_price()?, price),
            OrderType::Stop => stop_crossed(side, self.order.stop_price()?, price).then_some(price),
            OrderType::StopLimit => {
                if !self.armed {
                    self.armed = stop_crossed(side, self.order.stop_price()?, price);
                }
                if self.armed {
                    limit_execution(side, self.order.limit_price()?, price)
                } else {
                    None
                }
            }
        }
    }
}

/// Buy limits fill at or below the limit, sell limits at or above.
fn limit_execution(side: OrderSide, limit: Decimal, price: Decimal) -> Option<Decimal> {
    let crossed = match side {
        OrderSide::Buy => price <= limit,
        OrderSide::Sell => price >= limit,
    };
    crossed.then_some(limit)
}

/// Buy stops trigger at or above the stop, sell stops at or below.
fn stop_crossed(side: OrderSide, stop: Decimal, price: Decimal) -> bool {
    match side {
        OrderSide::Buy => price >= stop,
        OrderSide::Sell => price <= stop,
    }
}

#[derive(Debug, Default)]
struct VenueState {
    resting: Vec<RestingOrder>,
    positions: BTreeMap<String, Position>,
    next_venue_id: u64,
}

impl VenueState {
    fn next_venue_id(&mut self) -> String {
        self.next_venue_id += 1;
        format!("SIM-{}", self.next_venue_id)
    }

    fn record_fill(&mut self, bot_name: &str, order: &Order, price: Decimal) {
        self.positions
            .entry(order.symbol().to_string())
            .or_insert_with(|| Position::flat(PositionKey::new(order.symbol(), bot_name)))
            .apply_fill(order.side(), order.remaining_quantity(), price);
    }
}

/// Venue that matches orders in memory.
#[derive(Debug)]
pub struct SimulatedBroker {
    bot_name: String,
    state: Mutex<VenueState>,
}

impl SimulatedBroker {
    /// Create a simulator whose positions are attributed to `bot_name`.
    #[must_use]
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            state: Mutex::new(VenueState::default()),
        }
    }

    /// Number of orders currently resting.
    #[must_use]
    pub fn resting_count(&self) -> usize {
        self.state.lock().resting.len()
    }
}

#[async_trait]
impl Broker for SimulatedBroker {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(&self) -> Result<(), BrokerError> {
        tracing::info!(bot = %self.bot_name, "Simulated broker connected");
        Ok(())
    }

    async fn place_order(
        &self,
        order: &Order,
        reference_price: Option<Decimal>,
    ) -> Result<Vec<ExecutionReport>, BrokerError> {
        let mut state = self.state.lock();

        if order.order_type() == OrderType::Market {
            let Some(price) = reference_price else {
                return Err(BrokerError::OrderRejected {
                    message: format!("No reference price for MARKET order on {}", order.symbol()),
                });
            };
            let venue_order_id = state.next_venue_id();
            state.record_fill(&self.bot_name, order, price);
            tracing::debug!(order_id = %order.id(), %price, "Simulated market fill");
            return Ok(vec![
                ExecutionReport::Accepted {
                    order_id: order.id().clone(),
                    venue_order_id,
                },
                ExecutionReport::Fill {
                    order_id: order.id().clone(),
                    cumulative_quantity: order.quantity(),
                    price,
                },
            ]);
        }

        let venue_order_id = state.next_venue_id();
        state.resting.push(RestingOrder::new(order.clone()));
        tracing::debug!(
            order_id = %order.id(),
            order_type = %order.order_type(),
            "Simulated order resting"
        );
        Ok(vec![ExecutionReport::Accepted {
            order_id: order.id().clone(),
            venue_order_id,
        }])
    }

    async fn cancel_order(&self, order: &Order) -> Result<bool, BrokerError> {
        let mut state = self.state.lock();
        let before = state.resting.len();
        state.resting.retain(|r| r.order.id() != order.id());
        Ok(state.resting.len() < before)
    }

    async fn get_positions(&self) -> Result<Vec<PositionSnapshot>, BrokerError> {
        let state = self.state.lock();
        Ok(state.positions.values().map(|p| p.snapshot(None)).collect())
    }

    async fn get_open_orders(&self) -> Result<Vec<Order>, BrokerError> {
        let state = self.state.lock();
        Ok(state.resting.iter().map(|r| r.order.clone()).collect())
    }

    fn match_tick(&self, tick: &Tick) -> Vec<ExecutionReport> {
        let mut state = self.state.lock();
        let mut fills = Vec::new();
        let mut closed_groups: HashSet<OrderId> = HashSet::new();

        state.resting.retain_mut(|resting| {
            if resting.order.symbol() != tick.symbol {
                return true;
            }
            if resting.oco_group().is_some_and(|g| closed_groups.contains(g)) {
                return false;
            }
            match resting.execution_price(tick.price) {
                Some(price) => {
                    if let Some(group) = resting.oco_group() {
                        closed_groups.insert(group.clone());
                    }
                    fills.push((resting.order.clone(), price));
                    false
                }
                None => true,
            }
        });

        // Exits that sat ahead of their filled sibling.
        if !closed_groups.is_empty() {
            state.resting.retain(|resting| {
                let withdraw = resting.oco_group().is_some_and(|g| closed_groups.contains(g));
                if withdraw {
                    tracing::debug!(order_id = %resting.order.id(), "OCO sibling withdrawn");
                }
                !withdraw
            });
        }

        let mut reports = Vec::with_capacity(fills.len());
        for (order, price) in fills {
            state.record_fill(&self.bot_name, &order, price);
            tracing::debug!(order_id = %order.id(), %price, "Simulated fill");
            reports.push(ExecutionReport::Fill {
                order_id: order.id().clone(),
                cumulative_quantity: order.quantity(),
                price,
            });
        }
        reports
    }
}
