//! Observability: structured logging, metrics, and the storage event bus.

mod event_bus;
mod logging;

pub use event_bus::{EventBus, global_event_bus};
pub use logging::{LogFormat, init as init_logging};

use crate::models::StorageEvent;

/// Publishes a storage event on the global event bus.
///
/// Best effort; events are advisory notifications, never part of an
/// operation's correctness.
pub fn record_event(event: StorageEvent) {
    tracing::debug!(event_type = event.event_type(), "storage event");
    global_event_bus().publish(event);
}
