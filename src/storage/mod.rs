//! Storage layer abstraction.
//!
//! One capability, two variants:
//! - **Embedded**: bare-repository commits built in the object database,
//!   accelerated by an in-memory document index (primary).
//! - **Disk**: worktree writes plus commits, glob-pattern lookups
//!   (secondary, durable audit trail).
//!
//! [`HybridStorage`] composes the two behind timeout-bounded fallback and
//! best-effort background reconciliation.

// Allow match_same_arms for explicit enum handling.
#![allow(clippy::match_same_arms)]
// Allow significant_drop_tightening - repository guards are scoped tightly
// enough already.
#![allow(clippy::significant_drop_tightening)]

pub mod disk;
pub mod embedded;
pub mod hybrid;
pub mod index;
pub mod metrics;
pub mod traits;

pub use disk::DiskBackend;
pub use embedded::EmbeddedBackend;
pub use hybrid::{HybridConfig, HybridStorage, PrimaryBackend, ReconcileStats};
pub use index::{CachedMetadata, DocumentIndex};
pub use traits::StorageBackend;

use crate::models::{DocumentId, METADATA_FILE};

/// Extracts document ids from a tree listing by the `metadata.json` suffix
/// convention.
pub(crate) fn ids_from_tree_paths(paths: &[String]) -> Vec<DocumentId> {
    paths
        .iter()
        .filter_map(|path| {
            path.strip_suffix(METADATA_FILE)?
                .strip_suffix('/')?
                .rsplit('/')
                .next()
        })
        .filter(|id| !id.is_empty())
        .map(DocumentId::from)
        .collect()
}
