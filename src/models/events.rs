//! Storage event types for the notification bus.

use super::DocumentId;
use crate::current_timestamp;
use uuid::Uuid;

/// Events emitted by storage backends.
///
/// Published to the broadcast bus after the commit succeeds; delivery is
/// best-effort and never blocks or fails the write path.
#[derive(Debug, Clone)]
pub enum StorageEvent {
    /// A document was committed to a backend.
    DocumentStored {
        /// Unique identifier for this event.
        event_id: String,
        /// The stored document's id.
        document_id: DocumentId,
        /// The commit that persisted the document.
        commit_id: String,
        /// The backend that performed the write.
        backend: &'static str,
        /// Unix timestamp (seconds).
        timestamp: u64,
    },
    /// A backend pair finished a reconciliation pass.
    Reconciled {
        /// Unique identifier for this event.
        event_id: String,
        /// Documents copied to the primary backend.
        copied_to_primary: usize,
        /// Documents copied to the secondary backend.
        copied_to_secondary: usize,
        /// Unix timestamp (seconds).
        timestamp: u64,
    },
}

impl StorageEvent {
    /// Creates a `DocumentStored` event stamped with the current time.
    #[must_use]
    pub fn document_stored(
        document_id: DocumentId,
        commit_id: impl Into<String>,
        backend: &'static str,
    ) -> Self {
        Self::DocumentStored {
            event_id: Uuid::new_v4().to_string(),
            document_id,
            commit_id: commit_id.into(),
            backend,
            timestamp: current_timestamp(),
        }
    }

    /// Creates a `Reconciled` event stamped with the current time.
    #[must_use]
    pub fn reconciled(copied_to_primary: usize, copied_to_secondary: usize) -> Self {
        Self::Reconciled {
            event_id: Uuid::new_v4().to_string(),
            copied_to_primary,
            copied_to_secondary,
            timestamp: current_timestamp(),
        }
    }

    /// Returns the event type as a static string for filtering and metrics.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::DocumentStored { .. } => "document_stored",
            Self::Reconciled { .. } => "reconciled",
        }
    }
}
