//! Domain event system: decoupled observation of the assistant pipeline.
//!
//! Events are published when something interesting happens (a message was
//! answered, a backend was switched). Other components subscribe to react
//! without tight coupling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A qualifying message was accepted for a response
    MessageReceived {
        room_id: String,
        event_id: String,
        sender: String,
        timestamp: DateTime<Utc>,
    },

    /// A completion was delivered to the room
    ResponseSent {
        room_id: String,
        backend: String,
        model: String,
        context_messages: usize,
        finish_reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The pipeline failed and an error reply was sent
    PipelineFailed {
        room_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The active backend changed
    BackendSwitched {
        backend: String,
        model: String,
        timestamp: DateTime<Utc>,
    },

    /// The active model changed
    ModelSwitched {
        backend: String,
        model: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
