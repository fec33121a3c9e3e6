//! Query executor selection and cancellation.

use super::eval;
use super::indexed::IndexedExecutor;
use super::tree_walk::TreeWalkExecutor;
use crate::Result;
use crate::models::{
    AuthorCount, Document, DocumentSummary, Query, QueryItem, QueryResult, SourceCount,
};
use crate::storage::StorageBackend;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag checked by executors between documents.
///
/// Cancellation takes effect at the next check point; a canceled query
/// returns an error rather than partial results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-canceled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A query execution strategy.
pub trait QueryExecutor: Send + Sync {
    /// Executes a parsed query against the backing storage.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QueryExecution`] when the query is canceled
    /// or the backend fails mid-execution.
    fn execute(&self, query: &Query, cancel: &CancelToken) -> Result<QueryResult>;
}

/// Selects the execution strategy for a backend.
///
/// Backends that maintain a document index get the indexed executor;
/// everything else gets the tree walker. Selection is by capability probe,
/// not by backend identity.
#[must_use]
pub fn executor_for(backend: Arc<dyn StorageBackend>) -> Box<dyn QueryExecutor> {
    if backend.has_index() {
        Box::new(IndexedExecutor::new(backend))
    } else {
        Box::new(TreeWalkExecutor::new(backend))
    }
}

/// Attribution credit marker looked for in document metadata and commit
/// trailers.
pub(super) const ATTRIBUTION_MARKER: &str = "Caia Tech";

/// Sorts and truncates matched documents per the query's `ORDER BY` and
/// `LIMIT`, then wraps them as summary items.
///
/// Both executors finish document queries here so ordering semantics
/// cannot drift between strategies.
pub(super) fn finish_documents(mut docs: Vec<Document>, query: &Query) -> Vec<QueryItem> {
    if let Some(field) = &query.order_by {
        docs.sort_by(|a, b| {
            let ord = eval::compare_for_sort(
                eval::field_value(a, field).as_deref(),
                eval::field_value(b, field).as_deref(),
            );
            if query.descending { ord.reverse() } else { ord }
        });
    }
    docs.truncate(query.limit);
    docs.iter()
        .map(|doc| QueryItem::Document(DocumentSummary::from(doc)))
        .collect()
}

/// Aggregates matched documents by source type, count descending then name.
pub(super) fn finish_sources(docs: &[Document], limit: usize) -> Vec<QueryItem> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for doc in docs {
        *counts.entry(doc.source.source_type.clone()).or_default() += 1;
    }
    sorted_counts(counts)
        .into_iter()
        .take(limit)
        .map(|(source, document_count)| {
            QueryItem::Source(SourceCount {
                source,
                document_count,
            })
        })
        .collect()
}

/// Aggregates matched documents by the `author` metadata field, count
/// descending then name. Documents without an author are not counted.
pub(super) fn finish_authors(docs: &[Document], limit: usize) -> Vec<QueryItem> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for doc in docs {
        if let Some(author) = doc.content.metadata.get("author") {
            *counts.entry(author.clone()).or_default() += 1;
        }
    }
    sorted_counts(counts)
        .into_iter()
        .take(limit)
        .map(|(author, document_count)| {
            QueryItem::Author(AuthorCount {
                author,
                document_count,
            })
        })
        .collect()
}

fn sorted_counts(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut entries: Vec<_> = counts.into_iter().collect();
    entries.sort_by(|(name_a, count_a), (name_b, count_b)| {
        count_b.cmp(count_a).then_with(|| name_a.cmp(name_b))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, DocumentId, QueryType, Source};
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn doc(id: &str, source: &str, author: Option<&str>, age_days: i64) -> Document {
        let ts = Utc::now() - Duration::days(age_days);
        let mut metadata = HashMap::new();
        if let Some(author) = author {
            metadata.insert("author".to_string(), author.to_string());
        }
        Document {
            id: DocumentId::new(id),
            source: Source {
                source_type: source.to_string(),
                url: Some(format!("https://example.com/{id}")),
                path: None,
            },
            content: Content {
                raw: None,
                text: String::new(),
                metadata,
                embeddings: None,
            },
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());

        let shared = token.clone();
        shared.cancel();
        assert!(token.is_canceled());
    }

    #[test]
    fn test_finish_documents_orders_and_limits() {
        let docs = vec![
            doc("old", "web", None, 30),
            doc("newest", "web", None, 1),
            doc("mid", "web", None, 10),
        ];
        let mut query = Query::new(QueryType::Documents);
        query.order_by = Some("created_at".to_string());
        query.descending = true;
        query.limit = 2;

        let items = finish_documents(docs, &query);
        assert_eq!(items.len(), 2);
        let QueryItem::Document(first) = &items[0] else {
            panic!("expected a document item");
        };
        assert_eq!(first.id, "newest");
    }

    #[test]
    fn test_finish_sources_counts_descending() {
        let docs = vec![
            doc("a", "arxiv", None, 0),
            doc("b", "arxiv", None, 0),
            doc("c", "pubmed", None, 0),
        ];
        let items = finish_sources(&docs, 10);
        assert_eq!(
            items[0],
            QueryItem::Source(SourceCount {
                source: "arxiv".to_string(),
                document_count: 2,
            })
        );
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_finish_authors_skips_unattributed() {
        let docs = vec![
            doc("a", "web", Some("Doe"), 0),
            doc("b", "web", Some("Doe"), 0),
            doc("c", "web", None, 0),
        ];
        let items = finish_authors(&docs, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0],
            QueryItem::Author(AuthorCount {
                author: "Doe".to_string(),
                document_count: 2,
            })
        );
    }
}
