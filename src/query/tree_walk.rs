//! Tree-walking query execution.
//!
//! Works against any backend by walking the current commit tree directly:
//! metadata files are read and parsed per document, with extracted text
//! loaded only when a filter or sort actually touches it. Attribution
//! queries read commit message trailers instead of the tree.

use super::eval;
use super::executor::{
    ATTRIBUTION_MARKER, CancelToken, QueryExecutor, finish_authors, finish_documents,
    finish_sources,
};
use crate::models::{
    AttributionSummary, CONTENT_FILE, Document, METADATA_FILE, MetadataFile, Query, QueryItem,
    QueryResult, QueryType,
};
use crate::storage::StorageBackend;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Commit history depth scanned for attribution trailers.
const ATTRIBUTION_HISTORY_LIMIT: usize = 1000;

/// Executor that walks the commit tree without requiring an index.
pub struct TreeWalkExecutor {
    backend: Arc<dyn StorageBackend>,
}

impl TreeWalkExecutor {
    /// Creates a tree-walking executor over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Walks metadata files in the current tree and reassembles matching
    /// documents.
    ///
    /// Short-circuits once `limit` documents match, but only for unsorted
    /// queries; a sort must see every match to be correct.
    fn walk_documents(
        &self,
        query: &Query,
        cancel: &CancelToken,
        limit: Option<usize>,
    ) -> Result<Vec<Document>> {
        let needs_text = references_text(query);
        let can_stop_early = limit.is_some() && query.order_by.is_none();

        let mut docs = Vec::new();
        for path in self.backend.tree_paths()? {
            if cancel.is_canceled() {
                return Err(Error::QueryExecution("query canceled".to_string()));
            }
            let Some(dir) = path
                .strip_suffix(METADATA_FILE)
                .and_then(|p| p.strip_suffix('/'))
            else {
                continue;
            };

            let doc = match self.load_document(&path, dir, needs_text) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::debug!(path, error = %err, "skipping unreadable tree entry");
                    continue;
                },
            };
            if eval::matches_all(&doc, &query.filters) {
                docs.push(doc);
                if can_stop_early && limit.is_some_and(|limit| docs.len() >= limit) {
                    break;
                }
            }
        }
        Ok(docs)
    }

    fn load_document(&self, metadata_path: &str, dir: &str, needs_text: bool) -> Result<Document> {
        let bytes = self.backend.read_path(metadata_path)?;
        let metadata: MetadataFile = serde_json::from_slice(&bytes)
            .map_err(|e| Error::operation("parse_metadata", e))?;

        let text = if needs_text {
            let content_path = format!("{dir}/{CONTENT_FILE}");
            match self.backend.read_path(&content_path) {
                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                Err(_) => String::new(),
            }
        } else {
            String::new()
        };

        Ok(metadata.into_document(text, None))
    }

    /// Aggregates attribution from commit message trailers, newest commits
    /// first. Counts commits per source, so a re-stored document counts
    /// once per store.
    fn attribution_from_history(&self, limit: usize) -> Result<Vec<QueryItem>> {
        let mut per_source: BTreeMap<String, (usize, bool)> = BTreeMap::new();
        for message in self.backend.commit_messages(ATTRIBUTION_HISTORY_LIMIT)? {
            let Some(source) = trailer(&message, "Source: ") else {
                continue;
            };
            let entry = per_source.entry(source.to_string()).or_insert((0, false));
            entry.0 += 1;
            if trailer(&message, "Attribution: ")
                .is_some_and(|a| a.contains(ATTRIBUTION_MARKER))
            {
                entry.1 = true;
            }
        }

        let mut entries: Vec<_> = per_source.into_iter().collect();
        entries.sort_by(|(name_a, (count_a, _)), (name_b, (count_b, _))| {
            count_b.cmp(count_a).then_with(|| name_a.cmp(name_b))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(source, (document_count, caia_attribution))| {
                QueryItem::Attribution(AttributionSummary {
                    source,
                    document_count,
                    caia_attribution,
                })
            })
            .collect())
    }
}

impl QueryExecutor for TreeWalkExecutor {
    fn execute(&self, query: &Query, cancel: &CancelToken) -> Result<QueryResult> {
        let start = Instant::now();

        let items = match query.query_type {
            QueryType::Documents => {
                let docs = self.walk_documents(query, cancel, Some(query.limit))?;
                finish_documents(docs, query)
            },
            QueryType::Sources => {
                let docs = self.walk_documents(query, cancel, None)?;
                finish_sources(&docs, query.limit)
            },
            QueryType::Authors => {
                let docs = self.walk_documents(query, cancel, None)?;
                finish_authors(&docs, query.limit)
            },
            QueryType::Attribution => self.attribution_from_history(query.limit)?,
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(QueryResult::new(query.query_type, items, elapsed_ms))
    }
}

/// Whether a query's filters or sort touch the extracted text.
fn references_text(query: &Query) -> bool {
    let is_text = |field: &str| matches!(field, "text" | "content");
    query.filters.iter().any(|f| is_text(&f.field))
        || query.order_by.as_deref().is_some_and(is_text)
}

/// Extracts a trailer value from a commit message by line prefix.
fn trailer<'a>(message: &'a str, prefix: &str) -> Option<&'a str> {
    message
        .lines()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, DocumentId, Source};
    use crate::query::parse_query;
    use crate::storage::DiskBackend;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn disk_backend_with_corpus() -> (TempDir, Arc<dyn StorageBackend>) {
        let dir = TempDir::new().unwrap();
        let backend: Arc<dyn StorageBackend> =
            Arc::new(DiskBackend::open(dir.path().join("vault")).unwrap());

        let corpus = [
            ("arxiv1", "arxiv", Some("Caia Tech"), 3),
            ("arxiv2", "arxiv", Some("Caia Tech"), 2),
            ("pubmed1", "pubmed", None, 1),
        ];
        for (id, source, attribution, age_days) in corpus {
            let ts = Utc::now() - Duration::days(age_days);
            let mut metadata = HashMap::new();
            metadata.insert("author".to_string(), "Doe".to_string());
            if let Some(attribution) = attribution {
                metadata.insert("attribution".to_string(), attribution.to_string());
            }
            let doc = Document {
                id: DocumentId::new(id),
                source: Source {
                    source_type: source.to_string(),
                    url: Some(format!("https://example.com/{id}")),
                    path: None,
                },
                content: Content {
                    raw: None,
                    text: format!("searchable body of {id}"),
                    metadata,
                    embeddings: None,
                },
                created_at: ts,
                updated_at: ts,
            };
            backend.store(&doc).unwrap();
        }
        (dir, backend)
    }

    fn run(backend: &Arc<dyn StorageBackend>, gql: &str) -> QueryResult {
        let query = parse_query(gql).unwrap();
        TreeWalkExecutor::new(Arc::clone(backend))
            .execute(&query, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_documents_from_tree() {
        let (_dir, backend) = disk_backend_with_corpus();
        let result = run(&backend, "SELECT FROM documents WHERE source = arxiv");
        assert_eq!(result.count, 2);
    }

    #[test]
    fn test_text_filter_loads_content() {
        let (_dir, backend) = disk_backend_with_corpus();
        let result = run(
            &backend,
            "SELECT FROM documents WHERE text ~ \"body of pubmed1\"",
        );
        assert_eq!(result.count, 1);
        let QueryItem::Document(doc) = &result.items[0] else {
            panic!("expected a document item");
        };
        assert_eq!(doc.id, "pubmed1");
    }

    #[test]
    fn test_order_by_sees_all_matches_despite_limit() {
        let (_dir, backend) = disk_backend_with_corpus();
        let result = run(
            &backend,
            "SELECT FROM documents ORDER BY created_at DESC LIMIT 1",
        );
        assert_eq!(result.count, 1);
        let QueryItem::Document(doc) = &result.items[0] else {
            panic!("expected a document item");
        };
        assert_eq!(doc.id, "pubmed1");
    }

    #[test]
    fn test_sources_aggregation() {
        let (_dir, backend) = disk_backend_with_corpus();
        let result = run(&backend, "SELECT FROM sources");
        assert_eq!(result.count, 2);
        assert_eq!(
            result.items[0],
            QueryItem::Source(crate::models::SourceCount {
                source: "arxiv".to_string(),
                document_count: 2,
            })
        );
    }

    #[test]
    fn test_attribution_from_commit_trailers() {
        let (_dir, backend) = disk_backend_with_corpus();
        let result = run(&backend, "SELECT FROM attribution");
        let items: Vec<_> = result
            .items
            .iter()
            .map(|item| match item {
                QueryItem::Attribution(a) => {
                    (a.source.as_str(), a.document_count, a.caia_attribution)
                },
                other => panic!("unexpected item {other:?}"),
            })
            .collect();
        assert!(items.contains(&("arxiv", 2, true)));
        assert!(items.contains(&("pubmed", 1, false)));
    }

    #[test]
    fn test_trailer_extraction() {
        let message = "Add document x\n\nSource: arxiv\nAttribution: Caia Tech";
        assert_eq!(trailer(message, "Source: "), Some("arxiv"));
        assert_eq!(trailer(message, "Attribution: "), Some("Caia Tech"));
        assert_eq!(trailer("Add document y", "Source: "), None);
    }

    #[test]
    fn test_canceled_walk_errors() {
        let (_dir, backend) = disk_backend_with_corpus();
        let cancel = CancelToken::new();
        cancel.cancel();
        let query = parse_query("SELECT FROM documents").unwrap();
        let result = TreeWalkExecutor::new(backend).execute(&query, &cancel);
        assert!(matches!(result, Err(Error::QueryExecution(_))));
    }
}
