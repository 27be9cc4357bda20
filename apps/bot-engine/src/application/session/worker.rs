//! Session worker: the single owner of a session's ledger.
//!
//! Consumes the session queue, runs broker calls in a `JoinSet`, and
//! applies their results back onto the ledger. Every ledger mutation is
//! followed by a flush that publishes the ledger's events and executes its
//! venue actions.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Interval, MissedTickBehavior};

use super::{SessionConfig, SessionError, SessionEvent, SessionSnapshot};
use crate::application::ports::{
    Broker, BrokerError, DataFeed, FeedError, FeedEvent, StatePublisher,
};
use crate::domain::bot::{BotState, BotStatus};
use crate::domain::ledger::{
    ExecutionReport, LedgerError, LedgerEvent, OrderLedger, Placement, VenueAction,
};
use crate::domain::log::{LogLevel, SystemLog};
use crate::domain::market::Tick;
use crate::domain::order::{Order, OrderRequest, OrderStatus};
use crate::domain::shared::OrderId;
use crate::domain::sync::SyncMessage;
use crate::infrastructure::metrics::{self, OrderOutcome};

/// Result of one broker call.
enum BrokerOutcome {
    Placed {
        order_id: OrderId,
        result: Result<Vec<ExecutionReport>, BrokerError>,
    },
    Cancelled {
        order_id: OrderId,
        result: Result<bool, BrokerError>,
    },
    Polled(Result<Vec<ExecutionReport>, BrokerError>),
}

/// Why the run loop ended.
enum Exit {
    Requested(oneshot::Sender<BotStatus>),
    FeedTerminated(FeedError),
    QueueClosed,
}

pub(super) struct SessionWorker {
    config: SessionConfig,
    status: BotStatus,
    ledger: OrderLedger,
    broker: Arc<dyn Broker>,
    feed: Arc<dyn DataFeed>,
    publisher: Arc<dyn StatePublisher>,
    rx: mpsc::Receiver<SessionEvent>,
    tasks: JoinSet<BrokerOutcome>,
    last_prices: HashMap<String, Decimal>,
    /// Orders whose venue placement has not answered yet.
    placing: HashSet<OrderId>,
    /// Cancels requested while the placement was still in flight.
    cancel_after_place: HashSet<OrderId>,
    poll_in_flight: bool,
    stopping: bool,
}

impl SessionWorker {
    pub(super) fn new(
        config: SessionConfig,
        status: BotStatus,
        ledger: OrderLedger,
        broker: Arc<dyn Broker>,
        feed: Arc<dyn DataFeed>,
        publisher: Arc<dyn StatePublisher>,
        rx: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            config,
            status,
            ledger,
            broker,
            feed,
            publisher,
            rx,
            tasks: JoinSet::new(),
            last_prices: HashMap::new(),
            placing: HashSet::new(),
            cancel_after_place: HashSet::new(),
            poll_in_flight: false,
            stopping: false,
        }
    }

    /// Publish what the ledger queued while being seeded.
    pub(super) fn publish_seeded(&mut self) {
        self.flush();
    }

    /// Run until stopped, then shut down in order.
    pub(super) async fn run(mut self) {
        let mut poll = self.config.poll_interval.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        let exit = loop {
            tokio::select! {
                event = self.rx.recv() => {
                    let Some(event) = event else {
                        break Exit::QueueClosed;
                    };
                    if let Some(exit) = self.handle_event(event) {
                        break exit;
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.handle_joined(joined);
                }
                () = next_poll(&mut poll) => self.poll_venue(),
            }
        };

        self.shutdown(exit).await;
    }

    // =========================================================================
    // Queue handling
    // =========================================================================

    fn handle_event(&mut self, event: SessionEvent) -> Option<Exit> {
        match event {
            SessionEvent::Feed(FeedEvent::Tick(tick)) => self.handle_tick(&tick),
            SessionEvent::Feed(FeedEvent::Connected) => {
                tracing::info!(feed = self.feed.name(), "Market data feed connected");
                self.log(LogLevel::Info, format!("{} feed connected", self.feed.name()));
            }
            SessionEvent::Feed(FeedEvent::Disconnected) => {
                tracing::warn!(feed = self.feed.name(), "Market data feed disconnected");
                self.log(LogLevel::Risk, format!("{} feed disconnected", self.feed.name()));
            }
            SessionEvent::Feed(FeedEvent::Reconnecting { attempt }) => {
                self.log(
                    LogLevel::Info,
                    format!("{} feed reconnecting (attempt {attempt})", self.feed.name()),
                );
            }
            SessionEvent::Feed(FeedEvent::Subscribed(symbols)) => {
                tracing::debug!(feed = self.feed.name(), ?symbols, "Subscription in effect");
            }
            SessionEvent::Feed(FeedEvent::Terminated(err)) => {
                return Some(Exit::FeedTerminated(err));
            }
            SessionEvent::PlaceOrder {
                request,
                reference_price,
                reply,
            } => {
                let result = self.place_order(&request, reference_price);
                let _ = reply.send(result);
            }
            SessionEvent::CancelOrder { order_id, reply } => {
                let result = self.cancel_order(&order_id);
                let _ = reply.send(result);
            }
            SessionEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionEvent::Stop { reply } => return Some(Exit::Requested(reply)),
        }
        None
    }

    fn handle_tick(&mut self, tick: &Tick) {
        metrics::record_tick(self.feed.name());
        self.last_prices.insert(tick.symbol.clone(), tick.price);
        self.ledger.mark_price(tick);

        let reports = self.broker.match_tick(tick);
        self.apply_reports(reports);
        self.flush();
    }

    fn place_order(
        &mut self,
        request: &OrderRequest,
        reference_price: Option<Decimal>,
    ) -> Result<Placement, SessionError> {
        self.log(
            LogLevel::Cmd,
            format!(
                "{} {} {} {}",
                request.side, request.quantity, request.symbol, request.order_type
            ),
        );

        let placement = match self.ledger.place_order(request) {
            Ok(placement) => placement,
            Err(err) => {
                metrics::record_order(OrderOutcome::Rejected, &self.config.bot_name);
                tracing::warn!(error = %err, "Order request refused");
                self.log(LogLevel::Error, format!("Order refused: {err}"));
                return Err(err.into());
            }
        };
        metrics::record_order(OrderOutcome::Placed, &self.config.bot_name);

        let order = placement.primary().clone();
        let reference = reference_price.or_else(|| self.last_prices.get(order.symbol()).copied());
        self.spawn_place(order, reference);
        self.flush();

        Ok(placement)
    }

    fn cancel_order(&mut self, order_id: &OrderId) -> Result<bool, SessionError> {
        let order = self
            .ledger
            .order(order_id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.clone()))?;

        if !order.is_open() {
            return Ok(false);
        }

        self.log(LogLevel::Cmd, format!("Cancel {order_id}"));
        if self.placing.contains(order_id) {
            // The venue does not know the order yet; cancel once it answers.
            tracing::debug!(order_id = %order_id, "Cancel deferred until placement completes");
            self.cancel_after_place.insert(order_id.clone());
        } else {
            self.spawn_cancel(order);
        }
        Ok(true)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status.clone(),
            positions: self.ledger.positions(),
            open_orders: self.ledger.open_orders(),
            orders: self.ledger.orders().cloned().collect(),
            trades: self.ledger.trades().to_vec(),
        }
    }

    fn poll_venue(&mut self) {
        if self.poll_in_flight {
            return;
        }
        let open_orders = self.ledger.open_orders();
        if open_orders.is_empty() {
            return;
        }

        self.poll_in_flight = true;
        let broker = Arc::clone(&self.broker);
        self.tasks.spawn(async move {
            BrokerOutcome::Polled(broker.poll_executions(&open_orders).await)
        });
    }

    // =========================================================================
    // Broker calls
    // =========================================================================

    fn spawn_place(&mut self, order: Order, reference_price: Option<Decimal>) {
        self.placing.insert(order.id().clone());
        let broker = Arc::clone(&self.broker);
        self.tasks.spawn(async move {
            let result = broker.place_order(&order, reference_price).await;
            BrokerOutcome::Placed {
                order_id: order.id().clone(),
                result,
            }
        });
    }

    fn spawn_cancel(&mut self, order: Order) {
        let broker = Arc::clone(&self.broker);
        self.tasks.spawn(async move {
            let result = broker.cancel_order(&order).await;
            BrokerOutcome::Cancelled {
                order_id: order.id().clone(),
                result,
            }
        });
    }

    fn handle_joined(&mut self, joined: Result<BrokerOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.handle_outcome(outcome),
            Err(err) => tracing::error!(error = %err, "Broker task failed"),
        }
        self.flush();
    }

    fn handle_outcome(&mut self, outcome: BrokerOutcome) {
        match outcome {
            BrokerOutcome::Placed {
                order_id,
                result: Ok(reports),
            } => {
                self.placing.remove(&order_id);
                self.apply_reports(reports);
                self.cancel_deferred(&order_id);
            }
            BrokerOutcome::Placed {
                order_id,
                result: Err(err),
            } => {
                self.placing.remove(&order_id);
                self.cancel_after_place.remove(&order_id);
                tracing::warn!(order_id = %order_id, error = %err, "Broker refused order");
                self.apply_reports(vec![ExecutionReport::Rejected {
                    order_id,
                    message: err.venue_message().to_string(),
                }]);
            }
            BrokerOutcome::Cancelled {
                order_id,
                result: Ok(true),
            } => self.apply_reports(vec![ExecutionReport::Cancelled { order_id }]),
            BrokerOutcome::Cancelled {
                order_id,
                result: Ok(false),
            } => {
                tracing::debug!(order_id = %order_id, "Venue reports order no longer cancelable");
            }
            BrokerOutcome::Cancelled {
                order_id,
                result: Err(err),
            } => {
                tracing::warn!(order_id = %order_id, error = %err, "Cancel failed");
                self.log(LogLevel::Error, format!("Cancel {order_id} failed: {err}"));
            }
            BrokerOutcome::Polled(result) => {
                self.poll_in_flight = false;
                match result {
                    Ok(reports) => self.apply_reports(reports),
                    Err(err) => tracing::warn!(error = %err, "Execution poll failed"),
                }
            }
        }
    }

    /// Issue a cancel that waited for the placement to complete.
    fn cancel_deferred(&mut self, order_id: &OrderId) {
        if !self.cancel_after_place.remove(order_id) {
            return;
        }
        match self.ledger.order(order_id).filter(|order| order.is_open()).cloned() {
            Some(order) => self.spawn_cancel(order),
            None => tracing::debug!(order_id = %order_id, "Order closed before deferred cancel"),
        }
    }

    fn apply_reports(&mut self, reports: Vec<ExecutionReport>) {
        for report in reports {
            let rejection = match &report {
                ExecutionReport::Rejected { order_id, message } => {
                    Some(format!("Order {order_id} rejected: {message}"))
                }
                _ => None,
            };
            let is_fill = matches!(report, ExecutionReport::Fill { .. });

            match self.ledger.apply_report(report) {
                Ok(true) => {
                    if is_fill {
                        metrics::record_order(OrderOutcome::Filled, &self.config.bot_name);
                    }
                    if let Some(text) = rejection {
                        metrics::record_order(OrderOutcome::Rejected, &self.config.bot_name);
                        self.log(LogLevel::Error, text);
                    }
                }
                Ok(false) => {}
                Err(err) => tracing::warn!(error = %err, "Execution report not applied"),
            }
        }
    }

    // =========================================================================
    // Outbox
    // =========================================================================

    /// Publish everything the ledger queued and execute its venue actions.
    fn flush(&mut self) {
        loop {
            let outbox = self.ledger.drain();
            if outbox.is_empty() {
                break;
            }

            for event in outbox.events {
                match event {
                    LedgerEvent::Order(order) => {
                        if order.status() == OrderStatus::Cancelled {
                            metrics::record_order(OrderOutcome::Cancelled, &self.config.bot_name);
                        }
                        self.publisher.publish(SyncMessage::OrderUpdate(order));
                    }
                    LedgerEvent::Position(position) => {
                        self.publisher.publish(SyncMessage::PositionUpdate(position));
                    }
                    LedgerEvent::Trade(trade) => {
                        self.log(
                            LogLevel::Trade,
                            format!(
                                "{} {} {} @ {}",
                                trade.side, trade.quantity, trade.symbol, trade.price
                            ),
                        );
                    }
                }
            }

            for action in outbox.actions {
                match action {
                    VenueAction::Submit(order) if self.stopping => {
                        // Never reached the venue; close it locally.
                        if let Err(err) = self.ledger.cancel_order(order.id()) {
                            tracing::warn!(error = %err, "Could not close unsubmitted order");
                        }
                    }
                    VenueAction::Submit(order) => self.spawn_place(order, None),
                    VenueAction::Cancel(order) => self.spawn_cancel(order),
                }
            }
        }

        metrics::set_open_orders(&self.config.bot_name, self.ledger.open_orders().len());
    }

    fn log(&self, level: LogLevel, message: String) {
        self.publisher
            .publish(SyncMessage::LogMessage(SystemLog::new(
                level,
                self.config.bot_name.clone(),
                message,
            )));
    }

    fn set_status(&mut self, status: BotStatus) {
        self.status = status;
        self.publisher
            .publish(SyncMessage::BotStatusUpdate(self.status.clone()));
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    async fn shutdown(mut self, exit: Exit) {
        let (reply, failure) = match exit {
            Exit::Requested(reply) => (Some(reply), None),
            Exit::FeedTerminated(err) => (None, Some(err.to_string())),
            Exit::QueueClosed => (None, None),
        };

        tracing::info!(bot = %self.config.bot_name, "Stopping session");
        self.stopping = true;
        self.rx.close();

        // In-flight broker calls first, so their results reach the ledger.
        self.drain_tasks().await;

        for order in self.ledger.open_orders() {
            match self.broker.cancel_order(&order).await {
                Ok(true) => {
                    if let Err(err) = self.ledger.cancel_order(order.id()) {
                        tracing::warn!(error = %err, "Cancel not recorded");
                    }
                }
                Ok(false) => {
                    tracing::debug!(order_id = %order.id(), "Order no longer cancelable");
                }
                Err(err) => {
                    tracing::warn!(order_id = %order.id(), error = %err, "Shutdown cancel failed");
                    self.log(
                        LogLevel::Error,
                        format!("Cancel {} failed during shutdown: {err}", order.id()),
                    );
                }
            }
            self.flush();
        }
        self.drain_tasks().await;

        self.feed.disconnect().await;

        let summary = self.ledger.teardown();
        tracing::info!(
            bot = %self.config.bot_name,
            orders = summary.orders,
            open_orders = summary.open_orders,
            trades = summary.trades,
            realized_pnl = %summary.realized_pnl,
            "Ledger torn down"
        );

        let status = match failure {
            Some(detail) => {
                tracing::error!(bot = %self.config.bot_name, error = %detail, "Session failed");
                self.log(LogLevel::Error, detail.clone());
                self.status.with_error(detail)
            }
            None => self.status.with_state(BotState::Stopped),
        };
        self.set_status(status);
        self.log(LogLevel::Info, "Session stopped".to_string());
        metrics::adjust_sessions(-1.0);
        metrics::set_open_orders(&self.config.bot_name, 0);

        self.refuse_pending();
        if let Some(reply) = reply {
            let _ = reply.send(self.status.clone());
        }
    }

    async fn drain_tasks(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            self.handle_joined(joined);
        }
    }

    /// Answer whatever was queued before the queue closed.
    fn refuse_pending(&mut self) {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                SessionEvent::PlaceOrder { reply, .. } => {
                    let _ = reply.send(Err(self.not_running()));
                }
                SessionEvent::CancelOrder { reply, .. } => {
                    let _ = reply.send(Err(self.not_running()));
                }
                SessionEvent::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                SessionEvent::Stop { reply } => {
                    let _ = reply.send(self.status.clone());
                }
                SessionEvent::Feed(_) => {}
            }
        }
    }

    fn not_running(&self) -> SessionError {
        SessionError::NotRunning(self.config.bot_name.clone())
    }
}

/// Wait for the next poll tick, or forever when polling is disabled.
async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
