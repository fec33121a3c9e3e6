//! Index-accelerated query execution.
//!
//! Enumerates ids from the backend's document index, fetches each document,
//! and filters in memory. Enumeration is O(corpus) for now; the index keeps
//! per-id cached metadata that a future planner could use to skip fetches
//! for source-only filters.

use super::eval;
use super::executor::{
    ATTRIBUTION_MARKER, CancelToken, QueryExecutor, finish_authors, finish_documents,
    finish_sources,
};
use crate::models::{
    AttributionSummary, Document, DocumentId, Query, QueryItem, QueryResult, QueryType,
};
use crate::storage::StorageBackend;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Executor for backends that maintain a document index.
pub struct IndexedExecutor {
    backend: Arc<dyn StorageBackend>,
}

impl IndexedExecutor {
    /// Creates an indexed executor over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Fetches every document passing the query's filters.
    ///
    /// Unreadable documents are skipped. The cancel token is checked
    /// between fetches so a runaway query stops within one document.
    fn matching_documents(&self, query: &Query, cancel: &CancelToken) -> Result<Vec<Document>> {
        let ids: Vec<String> = self.backend.index().map_or_else(
            || {
                self.backend.document_ids().map(|ids| {
                    ids.into_iter()
                        .map(|id| id.as_str().to_string())
                        .collect()
                })
            },
            |index| Ok(index.ids()),
        )?;

        let mut docs = Vec::new();
        for id in ids {
            if cancel.is_canceled() {
                return Err(Error::QueryExecution("query canceled".to_string()));
            }
            match self.backend.get(&DocumentId::new(&id)) {
                Ok(doc) => {
                    if eval::matches_all(&doc, &query.filters) {
                        docs.push(doc);
                    }
                },
                Err(err) => {
                    tracing::debug!(id, error = %err, "skipping unreadable document");
                },
            }
        }
        Ok(docs)
    }
}

impl QueryExecutor for IndexedExecutor {
    fn execute(&self, query: &Query, cancel: &CancelToken) -> Result<QueryResult> {
        let start = Instant::now();
        let docs = self.matching_documents(query, cancel)?;

        let items = match query.query_type {
            QueryType::Documents => finish_documents(docs, query),
            QueryType::Sources => finish_sources(&docs, query.limit),
            QueryType::Authors => finish_authors(&docs, query.limit),
            QueryType::Attribution => attribution_items(&docs, query.limit),
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(QueryResult::new(query.query_type, items, elapsed_ms))
    }
}

/// Aggregates attribution per source from document metadata. Sources whose
/// documents never credit the marker are still reported, with the flag
/// false.
fn attribution_items(docs: &[Document], limit: usize) -> Vec<QueryItem> {
    let mut per_source: BTreeMap<String, (usize, bool)> = BTreeMap::new();
    for doc in docs {
        let entry = per_source
            .entry(doc.source.source_type.clone())
            .or_insert((0, false));
        entry.0 += 1;
        if doc
            .content
            .metadata
            .get("attribution")
            .is_some_and(|a| a.contains(ATTRIBUTION_MARKER))
        {
            entry.1 = true;
        }
    }

    let mut entries: Vec<_> = per_source.into_iter().collect();
    entries.sort_by(|(name_a, (count_a, _)), (name_b, (count_b, _))| {
        count_b.cmp(count_a).then_with(|| name_a.cmp(name_b))
    });
    entries
        .into_iter()
        .take(limit)
        .map(|(source, (document_count, caia_attribution))| {
            QueryItem::Attribution(AttributionSummary {
                source,
                document_count,
                caia_attribution,
            })
        })
        .collect()
}
