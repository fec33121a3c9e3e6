//! Storage capability trait.

use super::index::DocumentIndex;
use crate::Result;
use crate::models::{Document, DocumentId, Filter};

/// The storage capability implemented by every backend variant.
///
/// Backends are the authoritative stores for documents. All methods take
/// `&self`; interior mutability keeps concurrency safety at the smallest
/// necessary scope (see the embedded and disk variants).
pub trait StorageBackend: Send + Sync {
    /// Stable backend name used in logs, metrics, and events.
    fn name(&self) -> &'static str;

    /// Validates and persists a document as one commit.
    ///
    /// Returns the commit id. Storing an existing id produces a new commit;
    /// documents are never mutated in place.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for bad document shape, or an
    /// operation error if the commit fails.
    fn store(&self, document: &Document) -> Result<String>;

    /// Retrieves a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the id cannot be resolved after
    /// every lookup strategy the backend has.
    fn get(&self, id: &DocumentId) -> Result<Document>;

    /// Merges a branch into the current head.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Merge`] on conflicts; conflicts are surfaced,
    /// never auto-resolved.
    fn merge_branch(&self, branch: &str) -> Result<()>;

    /// Reports whether the backend can currently serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BackendUnavailable`] when it cannot.
    fn health(&self) -> Result<()>;

    /// Returns the ids of all stored documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the current tree cannot be enumerated.
    fn document_ids(&self) -> Result<Vec<DocumentId>>;

    /// Returns every file path in the current commit tree.
    ///
    /// Feeds the tree-walking query executor and index rebuilds.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    fn tree_paths(&self) -> Result<Vec<String>>;

    /// Reads one file from the current commit tree.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the path does not exist.
    fn read_path(&self, path: &str) -> Result<Vec<u8>>;

    /// Returns up to `limit` commit messages, newest first.
    ///
    /// Feeds the tree-walking attribution query.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be walked.
    fn commit_messages(&self, limit: usize) -> Result<Vec<String>>;

    /// Whether this backend maintains a document index.
    ///
    /// Capability probe used to select a query executor; never replaced by
    /// downcasting.
    fn has_index(&self) -> bool {
        false
    }

    /// The backend's document index, when it has one.
    fn index(&self) -> Option<&DocumentIndex> {
        None
    }

    /// Lists documents matching the given filters.
    ///
    /// Unreadable documents are skipped so one corrupted entry cannot fail
    /// an entire listing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend cannot enumerate ids at all.
    fn list(&self, filters: &[Filter]) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        for id in self.document_ids()? {
            match self.get(&id) {
                Ok(doc) => {
                    if crate::query::eval::matches_all(&doc, filters) {
                        documents.push(doc);
                    }
                },
                Err(err) => {
                    tracing::debug!(id = %id, error = %err, "skipping unreadable document in list");
                },
            }
        }
        Ok(documents)
    }
}
