//! State Broadcaster
//!
//! Fans sync messages out to every attached observer and mirrors the
//! published state so a new observer can start from a snapshot.
//!
//! # Ordering
//!
//! Attaching and publishing take the same lock. An observer's first message
//! is an `initial_state` reflecting every delta published before the attach,
//! and every delta published after it follows in publish order.
//!
//! # Slow observers
//!
//! Each observer owns a bounded [`ObserverQueue`]. When it is full, a keyed
//! delta replaces the pending delta with the same key; anything else closes
//! the observer as lagging. Publishers never wait.

mod queue;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use queue::{CloseReason, ObserverQueue, PushOutcome};

use crate::application::ports::StatePublisher;
use crate::domain::bot::BotStatus;
use crate::domain::order::Order;
use crate::domain::position::{PositionKey, PositionSnapshot};
use crate::domain::sync::{Heartbeat, StateSnapshot, SyncMessage};
use crate::infrastructure::metrics;

/// Default per-observer queue bound.
pub const DEFAULT_OBSERVER_QUEUE_CAPACITY: usize = 1024;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// Broadcaster settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastConfig {
    /// Per-observer queue bound.
    pub observer_queue_capacity: usize,
    /// Heartbeat period.
    pub heartbeat_interval: Duration,
    /// Service name stamped on heartbeats.
    pub service_name: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            observer_queue_capacity: DEFAULT_OBSERVER_QUEUE_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            service_name: "bot-engine".to_string(),
        }
    }
}

// =============================================================================
// Mirrored State
// =============================================================================

#[derive(Debug, Default)]
struct MirroredState {
    positions: BTreeMap<PositionKey, PositionSnapshot>,
    open_orders: Vec<Order>,
    bot_statuses: BTreeMap<String, BotStatus>,
}

impl MirroredState {
    fn apply(&mut self, message: &SyncMessage) {
        match message {
            SyncMessage::PositionUpdate(position) => {
                self.positions.insert(position.key(), position.clone());
            }
            SyncMessage::OrderUpdate(order) => {
                let existing = self.open_orders.iter().position(|o| o.id() == order.id());
                match (existing, order.is_open()) {
                    (Some(index), true) => self.open_orders[index] = order.clone(),
                    (Some(index), false) => {
                        self.open_orders.remove(index);
                    }
                    (None, true) => self.open_orders.push(order.clone()),
                    (None, false) => {}
                }
            }
            SyncMessage::BotStatusUpdate(status) => {
                self.bot_statuses.insert(status.name.clone(), status.clone());
            }
            SyncMessage::InitialState(_) | SyncMessage::LogMessage(_) | SyncMessage::Heartbeat(_) => {}
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            positions: self.positions.values().cloned().collect(),
            orders: self.open_orders.clone(),
            bot_statuses: self.bot_statuses.clone(),
        }
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

#[derive(Debug)]
struct Hub {
    state: MirroredState,
    observers: HashMap<u64, Arc<ObserverQueue>>,
    next_observer_id: u64,
}

#[derive(Debug)]
struct Shared {
    config: BroadcastConfig,
    hub: Mutex<Hub>,
}

impl Shared {
    fn detach(&self, id: u64) {
        let mut hub = self.hub.lock();
        if hub.observers.remove(&id).is_some() {
            metrics::set_observers(hub.observers.len());
            tracing::debug!(observer = id, "Observer detached");
        }
    }
}

/// Fan-out point between sessions and observers.
///
/// Cloning yields another handle to the same broadcaster.
///
/// # Example
///
/// ```rust,ignore
/// let broadcaster = StateBroadcaster::new(BroadcastConfig::default());
/// let observer = broadcaster.attach();
/// broadcaster.publish(SyncMessage::Heartbeat(Heartbeat::now("bot-engine")));
/// let first = observer.recv().await?; // initial_state
/// ```
#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    shared: Arc<Shared>,
}

impl StateBroadcaster {
    /// Create a broadcaster with no observers and empty state.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                hub: Mutex::new(Hub {
                    state: MirroredState::default(),
                    observers: HashMap::new(),
                    next_observer_id: 1,
                }),
            }),
        }
    }

    /// Broadcaster settings.
    #[must_use]
    pub fn config(&self) -> &BroadcastConfig {
        &self.shared.config
    }

    /// Register an observer. Its first message is the current snapshot.
    #[must_use]
    pub fn attach(&self) -> ObserverSubscription {
        let queue = Arc::new(ObserverQueue::new(self.shared.config.observer_queue_capacity));
        let mut hub = self.shared.hub.lock();

        let id = hub.next_observer_id;
        hub.next_observer_id += 1;
        queue.push(SyncMessage::InitialState(hub.state.snapshot()));
        hub.observers.insert(id, queue.clone());

        metrics::set_observers(hub.observers.len());
        metrics::record_broadcast_sent("initial_state", 1);
        tracing::debug!(observer = id, observers = hub.observers.len(), "Observer attached");

        ObserverSubscription {
            id,
            queue,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Current mirrored state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.shared.hub.lock().state.snapshot()
    }

    /// Attached observer count.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.shared.hub.lock().observers.len()
    }

    /// Close every observer stream.
    pub fn shutdown(&self) {
        let mut hub = self.shared.hub.lock();
        for queue in hub.observers.values() {
            queue.close(CloseReason::Shutdown);
        }
        hub.observers.clear();
        metrics::set_observers(0);
    }

    /// Publish a heartbeat every configured interval until `token` fires.
    pub fn spawn_heartbeat(&self, token: CancellationToken) -> JoinHandle<()> {
        let broadcaster = self.clone();
        let period = self.shared.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let service = broadcaster.shared.config.service_name.clone();
                        broadcaster.publish(SyncMessage::Heartbeat(Heartbeat::now(service)));
                    }
                }
            }
            tracing::debug!("Heartbeat task stopped");
        })
    }
}

impl StatePublisher for StateBroadcaster {
    fn publish(&self, message: SyncMessage) {
        let event = message.event_name();
        let mut hub = self.shared.hub.lock();
        hub.state.apply(&message);

        let mut delivered = 0_u64;
        let mut lagged = Vec::new();
        for (&id, queue) in &hub.observers {
            match queue.push(message.clone()) {
                PushOutcome::Queued => delivered += 1,
                PushOutcome::Coalesced => {
                    delivered += 1;
                    metrics::record_broadcast_coalesced(event);
                }
                PushOutcome::Lagged | PushOutcome::Closed => lagged.push(id),
            }
        }

        for id in lagged {
            hub.observers.remove(&id);
            metrics::record_observer_lagged();
            tracing::warn!(observer = id, event, "Observer lagged behind, disconnecting");
        }
        if delivered > 0 {
            metrics::record_broadcast_sent(event, delivered);
        }
        metrics::set_observers(hub.observers.len());
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Receiving end of one observer. Dropping it detaches the observer.
#[derive(Debug)]
pub struct ObserverSubscription {
    id: u64,
    queue: Arc<ObserverQueue>,
    shared: Weak<Shared>,
}

impl ObserverSubscription {
    /// Observer id, unique per broadcaster.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Next message for this observer.
    ///
    /// # Errors
    ///
    /// Returns why the stream ended: the observer lagged or the broadcaster
    /// shut down.
    pub async fn recv(&self) -> Result<SyncMessage, CloseReason> {
        self.queue.recv().await
    }
}

impl Drop for ObserverSubscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.detach(self.id);
        }
    }
}
