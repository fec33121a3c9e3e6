//! # Docvault
//!
//! Git-backed document intelligence storage and query engine.
//!
//! Docvault stores documents as commits in a git object database, giving
//! every write an immutable, auditable history. Lookups are accelerated by an
//! in-memory document index, availability is provided by a hybrid orchestrator
//! over two independently-failing backends, and discovery runs through GQL, a
//! small SQL-like query language.
//!
//! ## Architecture
//!
//! - **Document model**: the value type stored and queried; computes its own
//!   deterministic storage path.
//! - **Embedded backend**: bare-repository storage with atomic multi-file
//!   commits and an in-memory index (primary, fast).
//! - **Disk backend**: worktree-based storage with conventional filesystem
//!   writes (fallback, durable audit trail).
//! - **Hybrid storage**: timeout-bounded failover between the two plus
//!   best-effort background reconciliation.
//! - **GQL**: tokenizer, recursive-descent parser, and two query executors
//!   with identical semantics over different cost models.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docvault::{Document, EmbeddedBackend, StorageBackend};
//!
//! let backend = EmbeddedBackend::open("/var/lib/docvault/repo")?;
//! let commit_id = backend.store(&document)?;
//! let roundtrip = backend.get(&document.id)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod models;
pub mod observability;
pub mod query;
pub mod storage;

// Re-exports for convenience
pub use config::{DocvaultConfig, HybridConfig, PrimaryBackend};
pub use models::{
    Content, Document, DocumentId, DocumentSummary, Filter, FilterOperator, FilterValue, Query,
    QueryItem, QueryResult, QueryType, Source, StorageEvent, ValidationError,
};
pub use query::{CancelToken, QueryExecutor, executor_for, parse_query};
pub use storage::{DiskBackend, DocumentIndex, EmbeddedBackend, HybridStorage, StorageBackend};

/// Error type for docvault operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Document shape is invalid (client error, never retried) |
/// | `NotFound` | Identifier unresolved after index lookup and pattern search |
/// | `BackendUnavailable` | A backend cannot serve requests (fallback-eligible) |
/// | `Timeout` | A backend call exceeded the operation deadline |
/// | `QueryParse` | Malformed GQL with the offending byte position |
/// | `QueryExecution` | A query scan failed as a whole (per-document failures are skipped) |
/// | `Merge` | A branch merge hit conflicts (surfaced, never auto-resolved) |
/// | `OperationFailed` | I/O errors, git plumbing failures, serialization failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The document failed shape validation.
    ///
    /// Always a client error; no backend is ever consulted.
    #[error("invalid document: {0}")]
    Validation(#[from] ValidationError),

    /// No document with the given identifier exists.
    ///
    /// Raised after both the index lookup and the pattern-search fallback
    /// come up empty. The hybrid orchestrator treats this as
    /// fallback-eligible.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A backend cannot currently serve requests.
    #[error("backend '{backend}' unavailable: {cause}")]
    BackendUnavailable {
        /// The backend that is unavailable.
        backend: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// A backend call exceeded the configured operation deadline.
    ///
    /// Treated identically to any other backend failure by the orchestrator.
    #[error("operation '{operation}' on backend '{backend}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The backend the operation ran against.
        backend: &'static str,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// A GQL query string failed to parse.
    ///
    /// Carries the byte position of the unexpected token. No partial parse
    /// is ever returned.
    #[error("query parse error at position {position}: {message}")]
    QueryParse {
        /// Human-readable description of the unexpected token.
        message: String,
        /// Byte offset into the query string.
        position: usize,
    },

    /// A query scan failed as a whole.
    ///
    /// Per-document failures during a scan are skipped, not raised; this
    /// variant covers failures that invalidate the entire result (e.g. the
    /// scan was canceled or the tree could not be walked).
    #[error("query execution failed: {0}")]
    QueryExecution(String),

    /// A branch merge could not be completed.
    #[error("merge of branch '{branch}' failed: {cause}")]
    Merge {
        /// The branch that was being merged.
        branch: String,
        /// The underlying cause (e.g. conflicting paths).
        cause: String,
    },

    /// An operation failed.
    ///
    /// Wraps lower-level failures (git plumbing, filesystem I/O,
    /// serialization) with enough context to be logged meaningfully.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an `OperationFailed` from an operation name and any error.
    pub(crate) fn operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for docvault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so event payloads and index bookkeeping agree on a clock.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("doc-1".to_string());
        assert_eq!(err.to_string(), "document not found: doc-1");

        let err = Error::QueryParse {
            message: "expected FROM".to_string(),
            position: 7,
        };
        assert_eq!(
            err.to_string(),
            "query parse error at position 7: expected FROM"
        );

        let err = Error::OperationFailed {
            operation: "store".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'store' failed: disk full");
    }

    #[test]
    fn test_timeout_display_names_backend() {
        let err = Error::Timeout {
            operation: "get",
            backend: "embedded",
            timeout_ms: 250,
        };
        let text = err.to_string();
        assert!(text.contains("embedded"));
        assert!(text.contains("250ms"));
    }

    #[test]
    fn test_current_timestamp_is_positive() {
        assert!(current_timestamp() > 0);
    }
}
