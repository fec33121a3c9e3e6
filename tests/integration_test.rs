//! End-to-end tests over the public API: both backend variants, the hybrid
//! orchestrator, and GQL execution through each strategy.

use chrono::{Duration, Utc};
use docvault::config::HybridConfig;
use docvault::query::{CancelToken, executor_for};
use docvault::{
    Content, DiskBackend, Document, DocumentId, EmbeddedBackend, Error, HybridStorage, QueryItem,
    Source, StorageBackend,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

fn document(id: &str, source: &str, attribution: Option<&str>, age_days: i64) -> Document {
    let ts = Utc::now() - Duration::days(age_days);
    let mut metadata = HashMap::from([("author".to_string(), "Doe".to_string())]);
    if let Some(attribution) = attribution {
        metadata.insert("attribution".to_string(), attribution.to_string());
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
            text: format!("full text of {id}"),
            metadata,
            embeddings: None,
        },
        created_at: ts,
        updated_at: ts,
    }
}

fn embedded() -> (TempDir, Arc<dyn StorageBackend>) {
    let dir = TempDir::new().unwrap();
    let backend = EmbeddedBackend::open(dir.path().join("repo")).unwrap();
    (dir, Arc::new(backend))
}

fn disk() -> (TempDir, Arc<dyn StorageBackend>) {
    let dir = TempDir::new().unwrap();
    let backend = DiskBackend::open(dir.path().join("vault")).unwrap();
    (dir, Arc::new(backend))
}

/// Backend double whose every operation fails, for fallback tests.
struct DownBackend;

impl StorageBackend for DownBackend {
    fn name(&self) -> &'static str {
        "down"
    }

    fn store(&self, _document: &Document) -> docvault::Result<String> {
        Err(Error::BackendUnavailable {
            backend: "down",
            cause: "unreachable".to_string(),
        })
    }

    fn get(&self, id: &DocumentId) -> docvault::Result<Document> {
        Err(Error::NotFound(id.to_string()))
    }

    fn merge_branch(&self, branch: &str) -> docvault::Result<()> {
        Err(Error::Merge {
            branch: branch.to_string(),
            cause: "unreachable".to_string(),
        })
    }

    fn health(&self) -> docvault::Result<()> {
        Err(Error::BackendUnavailable {
            backend: "down",
            cause: "unreachable".to_string(),
        })
    }

    fn document_ids(&self) -> docvault::Result<Vec<DocumentId>> {
        Ok(Vec::new())
    }

    fn tree_paths(&self) -> docvault::Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn read_path(&self, path: &str) -> docvault::Result<Vec<u8>> {
        Err(Error::NotFound(path.to_string()))
    }

    fn commit_messages(&self, _limit: usize) -> docvault::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[test]
fn roundtrip_is_identical_across_backend_variants() {
    let (_edir, embedded) = embedded();
    let (_ddir, disk) = disk();
    let doc = document("shared1", "arxiv", Some("Caia Tech"), 1);

    for backend in [&embedded, &disk] {
        backend.store(&doc).unwrap();
        let retrieved = backend.get(&doc.id).unwrap();
        assert_eq!(retrieved.id, doc.id);
        assert_eq!(retrieved.source, doc.source);
        assert_eq!(retrieved.content.text, doc.content.text);
        assert_eq!(retrieved.content.metadata, doc.content.metadata);
    }
}

#[tokio::test]
async fn hybrid_serves_reads_from_fallback_when_primary_is_down() {
    let (_dir, secondary) = embedded();
    let doc = document("fallback1", "web", None, 0);
    secondary.store(&doc).unwrap();

    let hybrid = HybridStorage::new(
        Arc::new(DownBackend),
        secondary,
        HybridConfig::default(),
    );

    let retrieved = hybrid.get(&doc.id).await.unwrap();
    assert_eq!(retrieved.id, doc.id);
    assert!(hybrid.health().await.is_ok());
}

#[tokio::test]
async fn hybrid_reports_unhealthy_only_when_both_backends_fail() {
    let hybrid = HybridStorage::new(
        Arc::new(DownBackend),
        Arc::new(DownBackend),
        HybridConfig::default(),
    );
    assert!(hybrid.health().await.is_err());

    let doc = document("doomed", "web", None, 0);
    let err = hybrid.store(&doc).await.unwrap_err();
    assert!(err.to_string().contains("primary:"));
}

#[tokio::test]
async fn gql_runs_through_the_hybrid_facade() {
    let (_edir, embedded) = embedded();
    let (_ddir, disk) = disk();
    let hybrid = HybridStorage::new(embedded, disk, HybridConfig::default());

    for (i, source) in ["arxiv", "arxiv", "pubmed"].iter().enumerate() {
        let doc = document(&format!("doc{i}"), source, None, i as i64);
        hybrid.store(&doc).await.unwrap();
    }

    let result = hybrid
        .query("SELECT FROM sources")
        .await
        .unwrap();
    assert_eq!(result.count, 2);

    let err = hybrid.query("SELECT FROM nonsense").await.unwrap_err();
    assert!(matches!(err, Error::QueryParse { .. }));
}

#[test]
fn executor_strategies_agree_on_results() {
    let (_edir, embedded) = embedded();
    let (_ddir, disk) = disk();

    let corpus = [
        ("a1", "arxiv", Some("Caia Tech"), 5),
        ("a2", "arxiv", Some("Caia Tech"), 4),
        ("a3", "arxiv", Some("Caia Tech"), 3),
        ("p1", "pubmed", None, 2),
        ("w1", "web", None, 1),
    ];
    for (id, source, attribution, age) in corpus {
        let doc = document(id, source, attribution, age);
        embedded.store(&doc).unwrap();
        disk.store(&doc).unwrap();
    }

    let indexed = executor_for(Arc::clone(&embedded));
    let walking = executor_for(Arc::clone(&disk));
    let cancel = CancelToken::new();

    for gql in [
        "SELECT FROM documents WHERE source = arxiv ORDER BY created_at ASC",
        "SELECT FROM documents ORDER BY created_at DESC LIMIT 2",
        "SELECT FROM sources",
        "SELECT FROM authors",
    ] {
        let query = docvault::parse_query(gql).unwrap();
        let a = indexed.execute(&query, &cancel).unwrap();
        let b = walking.execute(&query, &cancel).unwrap();
        assert_eq!(a.count, b.count, "count diverged for {gql}");
        assert_eq!(a.items, b.items, "items diverged for {gql}");
    }
}

#[test]
fn ordered_limited_documents_query_returns_newest_first() {
    let (_dir, backend) = embedded();
    for (id, age) in [("d1", 10), ("d2", 8), ("d3", 6), ("d4", 4), ("d5", 2)] {
        backend.store(&document(id, "web", None, age)).unwrap();
    }

    let query =
        docvault::parse_query("SELECT FROM documents ORDER BY created_at DESC LIMIT 2")
            .unwrap();
    let result = executor_for(backend)
        .execute(&query, &CancelToken::new())
        .unwrap();

    assert_eq!(result.count, 2);
    let ids: Vec<_> = result
        .items
        .iter()
        .map(|item| match item {
            QueryItem::Document(d) => d.id.clone(),
            other => panic!("unexpected item {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec!["d5".to_string(), "d4".to_string()]);
}

#[test]
fn attribution_reports_credited_and_uncredited_sources() {
    let (_dir, backend) = embedded();
    for id in ["a1", "a2", "a3"] {
        backend
            .store(&document(id, "arxiv", Some("Caia Tech"), 0))
            .unwrap();
    }
    backend.store(&document("p1", "pubmed", None, 0)).unwrap();

    let query = docvault::parse_query("SELECT FROM attribution").unwrap();
    let result = executor_for(backend)
        .execute(&query, &CancelToken::new())
        .unwrap();

    let items: Vec<_> = result
        .items
        .iter()
        .map(|item| match item {
            QueryItem::Attribution(a) => (a.source.as_str(), a.document_count, a.caia_attribution),
            other => panic!("unexpected item {other:?}"),
        })
        .collect();
    assert_eq!(items, vec![("arxiv", 3, true), ("pubmed", 1, false)]);
}

#[test]
fn reopened_embedded_backend_rebuilds_its_index_from_the_tree() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("repo");

    {
        let backend = EmbeddedBackend::open(&path).unwrap();
        backend.store(&document("persist1", "web", None, 0)).unwrap();
        backend.store(&document("persist2", "web", None, 0)).unwrap();
    }

    let reopened = EmbeddedBackend::open(&path).unwrap();
    assert!(reopened.get(&DocumentId::new("persist1")).is_ok());
    assert!(reopened.get(&DocumentId::new("persist2")).is_ok());

    let mut ids: Vec<_> = reopened
        .document_ids()
        .unwrap()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["persist1", "persist2"]);
}

#[tokio::test]
async fn reconciliation_converges_divergent_backends() {
    let (_edir, embedded) = embedded();
    let (_ddir, disk) = disk();

    embedded
        .store(&document("only-embedded", "web", None, 0))
        .unwrap();
    disk.store(&document("only-disk", "web", None, 0)).unwrap();

    let stats = docvault::storage::hybrid::reconcile_once(&embedded, &disk)
        .await
        .unwrap();
    assert_eq!(stats.copied_to_primary, 1);
    assert_eq!(stats.copied_to_secondary, 1);

    assert!(embedded.get(&DocumentId::new("only-disk")).is_ok());
    assert!(disk.get(&DocumentId::new("only-embedded")).is_ok());
}
