//! In-memory document index.
//!
//! Maps document ids to their location in the commit tree plus a few cached
//! summary fields. The index is a derived structure: it can always be rebuilt
//! by walking the backend's current tree and extracting every path ending in
//! `metadata.json`. A miss is not an error, it triggers the slower
//! pattern-search fallback in the owning backend.

use crate::models::METADATA_FILE;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Summary fields cached alongside a document's location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMetadata {
    /// Source type.
    pub source_type: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One index entry: location plus cached summary fields.
///
/// `last_access` is atomic so lookups stay on the shared-lock path.
#[derive(Debug)]
struct IndexEntry {
    path: String,
    cached: Option<CachedMetadata>,
    last_access: AtomicU64,
}

/// In-memory map from document id to storage location.
///
/// Readers take a shared lock; writers take an exclusive lock. Lock scope is
/// the map only; document I/O always happens outside the lock.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl DocumentIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts an entry and refreshes its `last_access`. O(1).
    pub fn add(&self, id: &str, path: impl Into<String>, cached: Option<CachedMetadata>) {
        let entry = IndexEntry {
            path: path.into(),
            cached,
            last_access: AtomicU64::new(crate::current_timestamp()),
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(id.to_string(), entry);
        }
    }

    /// Looks up the storage path for an id. O(1); touches `last_access` on a
    /// hit.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(id)?;
        entry
            .last_access
            .store(crate::current_timestamp(), Ordering::Relaxed);
        Some(entry.path.clone())
    }

    /// Returns the cached summary fields for an id, if present.
    #[must_use]
    pub fn cached_metadata(&self, id: &str) -> Option<CachedMetadata> {
        let entries = self.entries.read().ok()?;
        entries.get(id)?.cached.clone()
    }

    /// Removes an entry. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.entries
            .write()
            .map(|mut entries| entries.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Removes all entries.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all indexed ids.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Replaces the entire map from a tree listing.
    ///
    /// Extracts an id from each path matching the `metadata.json` suffix
    /// convention; everything else is ignored. Used at backend startup and
    /// after corruption is detected. Returns the number of indexed entries.
    pub fn rebuild<I, S>(&self, all_paths: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let now = crate::current_timestamp();
        let mut fresh = HashMap::new();
        for path in all_paths {
            if let Some((id, base)) = id_from_metadata_path(path.as_ref()) {
                fresh.insert(
                    id.to_string(),
                    IndexEntry {
                        path: base.to_string(),
                        cached: None,
                        last_access: AtomicU64::new(now),
                    },
                );
            }
        }

        let count = fresh.len();
        if let Ok(mut entries) = self.entries.write() {
            *entries = fresh;
        }
        count
    }
}

/// Extracts `(id, base_dir)` from a path ending in `metadata.json`.
///
/// The id is the name of the directory containing the metadata file.
fn id_from_metadata_path(path: &str) -> Option<(&str, &str)> {
    let base = path.strip_suffix(METADATA_FILE)?.strip_suffix('/')?;
    let id = base.rsplit('/').next()?;
    if id.is_empty() { None } else { Some((id, base)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let index = DocumentIndex::new();
        index.add("doc1", "documents/do/c1/doc1", None);

        assert_eq!(index.get("doc1").as_deref(), Some("documents/do/c1/doc1"));
        assert_eq!(index.get("missing"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_add_is_upsert() {
        let index = DocumentIndex::new();
        index.add("doc1", "old/path", None);
        index.add("doc1", "new/path", None);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("doc1").as_deref(), Some("new/path"));
    }

    #[test]
    fn test_remove_and_clear() {
        let index = DocumentIndex::new();
        index.add("doc1", "p1", None);
        index.add("doc2", "p2", None);

        assert!(index.remove("doc1"));
        assert!(!index.remove("doc1"));
        assert_eq!(index.len(), 1);

        index.clear();
        assert_eq!(index.len(), 0);
        assert!(index.is_empty());
        assert_eq!(index.get("doc2"), None);
    }

    #[test]
    fn test_rebuild_from_tree_paths() {
        let index = DocumentIndex::new();
        index.add("stale", "gone", None);

        let paths = vec![
            "documents/ab/cd/abcd1/metadata.json".to_string(),
            "documents/ab/cd/abcd1/content.txt".to_string(),
            "documents/arXiv/2024/06/xyz/metadata.json".to_string(),
            "README.md".to_string(),
        ];
        let count = index.rebuild(&paths);

        assert_eq!(count, 2);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("abcd1").as_deref(), Some("documents/ab/cd/abcd1"));
        assert_eq!(
            index.get("xyz").as_deref(),
            Some("documents/arXiv/2024/06/xyz")
        );
        assert_eq!(index.get("stale"), None);
    }

    #[test]
    fn test_cached_metadata() {
        let index = DocumentIndex::new();
        let cached = CachedMetadata {
            source_type: "arXiv".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        index.add("doc1", "p1", Some(cached.clone()));

        assert_eq!(index.cached_metadata("doc1"), Some(cached));
        assert_eq!(index.cached_metadata("missing"), None);
    }

    #[test]
    fn test_id_from_metadata_path() {
        assert_eq!(
            id_from_metadata_path("documents/ab/cd/abcd/metadata.json"),
            Some(("abcd", "documents/ab/cd/abcd"))
        );
        assert_eq!(id_from_metadata_path("documents/ab/cd/abcd/content.txt"), None);
        assert_eq!(id_from_metadata_path("metadata.json"), None);
    }
}
