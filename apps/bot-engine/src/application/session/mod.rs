//! Bot Session
//!
//! A session owns one broker, one data feed and one order ledger, and is
//! the unit of concurrency isolation: a single worker task consumes a
//! bounded queue and is the only code touching the ledger.
//!
//! # Lifecycle
//!
//! Start: broker connect, feed connect and subscribe, seed flat positions,
//! status `Running`, spawn the worker.
//!
//! Stop: stop accepting orders, drain in-flight broker calls, cancel open
//! orders (best-effort), disconnect the feed, tear down the ledger, status
//! `Stopped` (or `Error` when the feed gave up reconnecting).

mod event;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

pub use event::{SessionEvent, SessionSnapshot};
use worker::SessionWorker;

use crate::application::ports::{
    Broker, BrokerError, DataFeed, FeedError, FeedSink, StatePublisher,
};
use crate::domain::bot::{BotState, BotStatus, StrategyDescriptor};
use crate::domain::ledger::{LedgerError, OrderLedger, Placement};
use crate::domain::log::{LogLevel, SystemLog};
use crate::domain::order::OrderRequest;
use crate::domain::shared::OrderId;
use crate::domain::sync::SyncMessage;
use crate::infrastructure::metrics;

/// Default session queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for one bot session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bot name; owns every order and position of the session.
    pub bot_name: String,
    /// Strategy descriptor published with the bot status.
    pub strategy: StrategyDescriptor,
    /// Symbols to subscribe and seed positions for.
    pub symbols: Vec<String>,
    /// Session queue bound.
    pub queue_capacity: usize,
    /// Venue execution polling period; `None` disables polling.
    pub poll_interval: Option<Duration>,
}

impl SessionConfig {
    /// Config with a `Manual` strategy on the first symbol and default limits.
    #[must_use]
    pub fn new(bot_name: impl Into<String>, symbols: Vec<String>) -> Self {
        let primary = symbols.first().cloned().unwrap_or_default();
        Self {
            bot_name: bot_name.into(),
            strategy: StrategyDescriptor::new("Manual", primary),
            symbols,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: None,
        }
    }

    /// Set the strategy descriptor.
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyDescriptor) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the queue bound.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Enable venue execution polling.
    #[must_use]
    pub const fn with_poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = Some(period);
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Broker failure (connect at start).
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Feed failure (connect or subscribe at start).
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Ledger refused the command.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The session has stopped.
    #[error("session {0} is not running")]
    NotRunning(String),
}

// =============================================================================
// Session
// =============================================================================

/// A bot session before start.
pub struct BotSession {
    config: SessionConfig,
    broker: Arc<dyn Broker>,
    feed: Arc<dyn DataFeed>,
    publisher: Arc<dyn StatePublisher>,
}

impl BotSession {
    /// Assemble a session.
    #[must_use]
    pub fn new(
        config: SessionConfig,
        broker: Arc<dyn Broker>,
        feed: Arc<dyn DataFeed>,
        publisher: Arc<dyn StatePublisher>,
    ) -> Self {
        Self {
            config,
            broker,
            feed,
            publisher,
        }
    }

    /// Connect broker and feed, then spawn the worker.
    ///
    /// # Errors
    ///
    /// Returns the broker or feed error that prevented start. The bot status
    /// is published as `Error` in that case.
    pub async fn start(self) -> Result<SessionHandle, SessionError> {
        let Self {
            config,
            broker,
            feed,
            publisher,
        } = self;
        let bot_name = config.bot_name.clone();
        let status = BotStatus::new(&bot_name, BotState::Running, config.strategy.clone());

        tracing::info!(
            bot = %bot_name,
            broker = broker.name(),
            feed = feed.name(),
            symbols = ?config.symbols,
            "Starting session"
        );

        if let Err(err) = broker.connect().await {
            tracing::error!(bot = %bot_name, error = %err, "Broker connect failed");
            publish_failure(publisher.as_ref(), &status, &err.to_string());
            return Err(err.into());
        }

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        if let Err(err) = feed.connect(FeedSink::new(tx.clone())).await {
            tracing::error!(bot = %bot_name, error = %err, "Feed connect failed");
            publish_failure(publisher.as_ref(), &status, &err.to_string());
            return Err(err.into());
        }
        if let Err(err) = feed.subscribe(config.symbols.clone()).await {
            tracing::error!(bot = %bot_name, error = %err, "Feed subscribe failed");
            feed.disconnect().await;
            publish_failure(publisher.as_ref(), &status, &err.to_string());
            return Err(err.into());
        }

        let mut ledger = OrderLedger::new(bot_name.clone());
        for symbol in &config.symbols {
            ledger.ensure_position(symbol);
        }

        publisher.publish(SyncMessage::BotStatusUpdate(status.clone()));
        publisher.publish(SyncMessage::LogMessage(SystemLog::new(
            LogLevel::Info,
            bot_name.clone(),
            format!("Session started on {} with {}", broker.name(), feed.name()),
        )));

        let span = tracing::info_span!("session", bot = %bot_name);
        let mut worker = SessionWorker::new(config, status, ledger, broker, feed, publisher, rx);
        worker.publish_seeded();
        tokio::spawn(worker.run().instrument(span));
        metrics::adjust_sessions(1.0);

        Ok(SessionHandle {
            bot_name: Arc::from(bot_name.as_str()),
            tx,
        })
    }
}

fn publish_failure(publisher: &dyn StatePublisher, status: &BotStatus, detail: &str) {
    publisher.publish(SyncMessage::BotStatusUpdate(status.with_error(detail)));
    publisher.publish(SyncMessage::LogMessage(SystemLog::new(
        LogLevel::Error,
        status.name.clone(),
        detail.to_string(),
    )));
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable command handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    bot_name: Arc<str>,
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Bot name of the session.
    #[must_use]
    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Returns true until the worker has stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Record an order and route it to the broker.
    ///
    /// Resolves once the ledger has recorded the order; venue results
    /// arrive later as order updates.
    pub async fn place_order(
        &self,
        request: OrderRequest,
        reference_price: Option<Decimal>,
    ) -> Result<Placement, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::PlaceOrder {
            request,
            reference_price,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.not_running())?
    }

    /// Ask the broker to cancel a working order.
    ///
    /// Returns `false` when the order is already terminal.
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<bool, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::CancelOrder { order_id, reply })
            .await?;
        rx.await.map_err(|_| self.not_running())?
    }

    /// Read the session state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.not_running())
    }

    /// Stop the session and wait for the shutdown sequence to finish.
    pub async fn stop(&self) -> Result<BotStatus, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Stop { reply }).await?;
        rx.await.map_err(|_| self.not_running())
    }

    async fn send(&self, event: SessionEvent) -> Result<(), SessionError> {
        self.tx.send(event).await.map_err(|_| self.not_running())
    }

    fn not_running(&self) -> SessionError {
        SessionError::NotRunning(self.bot_name.to_string())
    }
}
