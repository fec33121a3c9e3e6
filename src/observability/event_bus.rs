//! Tokio broadcast event bus for storage notifications.

use crate::models::StorageEvent;
use std::sync::OnceLock;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Central event bus for broadcasting storage events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StorageEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    pub fn publish(&self, event: StorageEvent) {
        metrics::counter!("event_bus_publish_total").increment(1);
        match self.sender.send(event) {
            Ok(_) => {},
            Err(_) => {
                // No subscribers; events are advisory.
                metrics::counter!("event_bus_publish_dropped_total").increment(1);
            },
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        metrics::counter!("event_bus_subscriptions_total").increment(1);
        self.sender.subscribe()
    }
}

static GLOBAL_EVENT_BUS: OnceLock<EventBus> = OnceLock::new();

/// Returns the global event bus, initializing it on first use.
#[must_use]
pub fn global_event_bus() -> &'static EventBus {
    GLOBAL_EVENT_BUS.get_or_init(|| EventBus::new(DEFAULT_EVENT_BUS_CAPACITY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();

        bus.publish(StorageEvent::document_stored(
            crate::models::DocumentId::new("doc1"),
            "commit1",
            "embedded",
        ));

        let event = receiver.recv().await.expect("receive event");
        assert_eq!(event.event_type(), "document_stored");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.publish(StorageEvent::reconciled(1, 2));
    }
}
