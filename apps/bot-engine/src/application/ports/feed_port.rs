//! Data Feed Port (Driven Port)
//!
//! Interface for real-time market data. Feeds push [`FeedEvent`]s into the
//! owning session's queue through a [`FeedSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::application::session::SessionEvent;
use crate::domain::market::Tick;

/// Data feed error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// Transport could not be opened.
    #[error("Feed connection error: {message}")]
    ConnectionError {
        /// Error details.
        message: String,
    },

    /// Reconnection gave up.
    #[error("Feed gave up after {attempts} reconnect attempts")]
    MaxReconnectExceeded {
        /// Attempts made.
        attempts: u32,
    },
}

/// Something a feed has to tell its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Transport is open (initially or after a reconnect).
    Connected,
    /// Transport closed; a reconnect may follow.
    Disconnected,
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The subscription set now in effect.
    Subscribed(Vec<String>),
    /// A normalized price update.
    Tick(Tick),
    /// The feed stopped for good. Nothing follows.
    Terminated(FeedError),
}

/// Sending half of a session queue, as seen by a feed.
///
/// Once a [`FeedEvent::Terminated`] has been sent through any clone of a sink,
/// every later send on every clone is dropped.
#[derive(Debug, Clone)]
pub struct FeedSink {
    tx: mpsc::Sender<SessionEvent>,
    terminated: Arc<AtomicBool>,
}

impl FeedSink {
    /// Wrap a session queue sender.
    #[must_use]
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            tx,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Sink plus its receiving end, for driving a feed without a session.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Deliver an event, waiting for queue space.
    ///
    /// Returns `false` when the event was dropped because the session is
    /// gone or the feed already terminated.
    pub async fn send(&self, event: FeedEvent) -> bool {
        let terminal = matches!(event, FeedEvent::Terminated(_));
        if terminal {
            if self.terminated.swap(true, Ordering::AcqRel) {
                return false;
            }
        } else if self.terminated.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(SessionEvent::Feed(event)).await.is_ok()
    }

    /// Returns true when nothing sent through this sink can arrive anymore.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.terminated.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

/// Port for market data feeds.
#[async_trait]
pub trait DataFeed: Send + Sync {
    /// Feed name for logs and metrics.
    fn name(&self) -> &str;

    /// Open the transport and start delivering into `sink`.
    ///
    /// Resolves once the transport is open.
    async fn connect(&self, sink: FeedSink) -> Result<(), FeedError>;

    /// Replace the subscription set. Valid before or after connect.
    async fn subscribe(&self, symbols: Vec<String>) -> Result<(), FeedError>;

    /// Stop every task and timer of this feed.
    async fn disconnect(&self);
}
