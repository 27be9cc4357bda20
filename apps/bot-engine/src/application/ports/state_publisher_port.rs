//! State Publisher Port (Driven Port)
//!
//! Interface for pushing state changes to observers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::sync::SyncMessage;

/// Port for publishing sync messages.
///
/// Publishing never blocks the caller; slow consumers are handled on the
/// publisher's side.
pub trait StatePublisher: Send + Sync {
    /// Publish one message.
    fn publish(&self, message: SyncMessage);

    /// Publish several messages in order.
    fn publish_all(&self, messages: Vec<SyncMessage>) {
        for message in messages {
            self.publish(message);
        }
    }
}

/// Publisher that keeps every message, for inspecting what a session emitted.
#[derive(Debug, Clone, Default)]
pub struct RecordingStatePublisher {
    messages: Arc<Mutex<Vec<SyncMessage>>>,
}

impl RecordingStatePublisher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything published so far.
    #[must_use]
    pub fn messages(&self) -> Vec<SyncMessage> {
        self.messages.lock().clone()
    }
}

impl StatePublisher for RecordingStatePublisher {
    fn publish(&self, message: SyncMessage) {
        self.messages.lock().push(message);
    }
}
