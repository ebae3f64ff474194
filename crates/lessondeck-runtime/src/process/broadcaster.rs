//! Backend lifecycle event broadcasting.

use lessondeck_core::BackendEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast channel capacity for lifecycle events.
const CHANNEL_CAPACITY: usize = 64;

/// Broadcaster for backend lifecycle events.
///
/// Owned by the supervisor; subscribers get every event emitted after they
/// subscribed. Slow subscribers lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<BackendEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast(&self, event: BackendEvent) {
        debug!(event = event.name(), port = ?event.state().port, "Backend lifecycle event");
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.sender.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
