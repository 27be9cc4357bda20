//! Per-observer bounded queue.
//!
//! A full queue makes room for a keyed delta by dropping the pending delta
//! with the same key and appending the new one at the back. With nothing to
//! replace, the observer is closed as lagging.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::domain::sync::SyncMessage;

/// Why an observer stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseReason {
    /// The observer fell behind with nothing left to coalesce.
    #[error("observer lagged behind and was dropped")]
    Lagged,
    /// The broadcaster went away.
    #[error("broadcaster shut down")]
    Shutdown,
}

/// Result of [`ObserverQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended.
    Queued,
    /// Replaced a pending message with the same key.
    Coalesced,
    /// The queue was full with nothing to replace; it is now closed.
    Lagged,
    /// The queue was already closed.
    Closed,
}

#[derive(Debug)]
struct QueueState {
    items: VecDeque<SyncMessage>,
    closed: Option<CloseReason>,
}

/// Bounded single-consumer message queue.
#[derive(Debug)]
pub struct ObserverQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl ObserverQueue {
    /// Create an empty queue holding at most `capacity` messages (min 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(64)),
                closed: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Offer a message.
    pub fn push(&self, message: SyncMessage) -> PushOutcome {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return PushOutcome::Closed;
            }

            if state.items.len() < self.capacity {
                state.items.push_back(message);
                PushOutcome::Queued
            } else if let Some(index) = message
                .key()
                .and_then(|key| state.items.iter().position(|m| m.key().as_ref() == Some(&key)))
            {
                state.items.remove(index);
                state.items.push_back(message);
                PushOutcome::Coalesced
            } else {
                state.items.clear();
                state.closed = Some(CloseReason::Lagged);
                PushOutcome::Lagged
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Close the queue; pending messages are still delivered.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut state = self.state.lock();
            if state.closed.is_none() {
                state.closed = Some(reason);
            }
        }
        self.notify.notify_one();
    }

    /// Wait for the next message.
    ///
    /// # Errors
    ///
    /// Returns why the queue closed once nothing is left to deliver.
    pub async fn recv(&self) -> Result<SyncMessage, CloseReason> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(message) = state.items.pop_front() {
                    return Ok(message);
                }
                if let Some(reason) = state.closed {
                    return Err(reason);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Pending message count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Returns true when nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
