//! Disk-resident commit-log backend.
//!
//! The secondary backend variant: conventional filesystem writes into a
//! worktree plus commit-log operations. Intentionally simpler and slower
//! than the embedded variant: no in-memory index, lookups run a
//! glob-pattern search over the known directory-depth conventions. Exists so
//! the system keeps functioning when the embedded variant is unavailable and
//! to preserve a durable, disk-visible audit trail.

use super::embedded::{collect_tree_paths, commit_messages, commit_tree, head_commit, head_tree,
    read_blob, signature};
use super::metrics::{record_operation, status_of};
use super::traits::StorageBackend;
use crate::models::{
    CONTENT_FILE, Document, DocumentId, METADATA_FILE, MetadataFile, RAW_FILE, StorageEvent,
};
use crate::models::is_safe_component;
use crate::observability::record_event;
use crate::{Error, Result};
use git2::{BranchType, Repository, build::CheckoutBuilder};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use walkdir::WalkDir;

/// Backend name used in logs, metrics, and events.
const NAME: &str = "disk";

/// Worktree-backed backend writing the date-partitioned layout.
pub struct DiskBackend {
    repo: Mutex<Repository>,
    root: PathBuf,
}

impl DiskBackend {
    /// Opens (or initializes) the repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened or created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        let repo = match Repository::open(&root) {
            Ok(repo) => repo,
            Err(_) => {
                Repository::init(&root).map_err(|e| Error::operation("open_disk_repo", e))?
            },
        };

        Ok(Self {
            repo: Mutex::new(repo),
            root,
        })
    }

    /// Returns the worktree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_repo(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo
            .lock()
            .map_err(|_| Error::operation("lock_repo", "repository lock poisoned"))
    }

    fn store_inner(&self, document: &Document) -> Result<String> {
        document.validate()?;

        let base_rel = document.partitioned_path();
        let base_abs = self.root.join(&base_rel);
        fs::create_dir_all(&base_abs).map_err(|e| Error::operation("create_document_dir", e))?;

        let metadata_bytes = serde_json::to_vec_pretty(&document.metadata_file())
            .map_err(|e| Error::operation("serialize_metadata", e))?;
        fs::write(base_abs.join(METADATA_FILE), &metadata_bytes)
            .map_err(|e| Error::operation("write_metadata_file", e))?;
        fs::write(base_abs.join(CONTENT_FILE), document.content.text.as_bytes())
            .map_err(|e| Error::operation("write_content_file", e))?;

        let mut staged = vec![
            format!("{base_rel}/{METADATA_FILE}"),
            format!("{base_rel}/{CONTENT_FILE}"),
        ];
        if let Some(raw) = &document.content.raw {
            fs::write(base_abs.join(RAW_FILE), raw)
                .map_err(|e| Error::operation("write_raw_file", e))?;
            staged.push(format!("{base_rel}/{RAW_FILE}"));
        }

        let commit_id = {
            let repo = self.lock_repo()?;
            let mut git_index = repo
                .index()
                .map_err(|e| Error::operation("open_git_index", e))?;
            for rel in &staged {
                git_index
                    .add_path(Path::new(rel))
                    .map_err(|e| Error::operation("stage_document_file", e))?;
            }
            git_index
                .write()
                .map_err(|e| Error::operation("write_git_index", e))?;
            let tree_oid = git_index
                .write_tree()
                .map_err(|e| Error::operation("write_tree", e))?;
            let tree = repo
                .find_tree(tree_oid)
                .map_err(|e| Error::operation("find_tree", e))?;

            commit_tree(&repo, &tree, &document.commit_message())?
        };

        record_event(StorageEvent::document_stored(
            document.id.clone(),
            commit_id.clone(),
            NAME,
        ));

        Ok(commit_id)
    }

    fn get_inner(&self, id: &DocumentId) -> Result<Document> {
        // An id with path characters can never have been stored; refusing it
        // here keeps the glob patterns literal.
        if !is_safe_component(id.as_str()) {
            return Err(Error::NotFound(id.to_string()));
        }

        let matcher = metadata_globs(id.as_str())?;
        let documents_root = self.root.join("documents");
        if !documents_root.exists() {
            return Err(Error::NotFound(id.to_string()));
        }

        for entry in WalkDir::new(&documents_root).into_iter().filter_map(
            std::result::Result::ok,
        ) {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            if matcher.is_match(rel) {
                return self.read_document_dir(entry.path().parent().unwrap_or(entry.path()));
            }
        }

        Err(Error::NotFound(id.to_string()))
    }

    fn read_document_dir(&self, dir: &Path) -> Result<Document> {
        let metadata_bytes = fs::read(dir.join(METADATA_FILE))
            .map_err(|e| Error::operation("read_metadata_file", e))?;
        let metadata: MetadataFile = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| Error::operation("parse_metadata", e))?;

        let text = fs::read(dir.join(CONTENT_FILE))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        let raw = fs::read(dir.join(RAW_FILE)).ok();

        Ok(metadata.into_document(text, raw))
    }

    fn merge_branch_inner(&self, branch: &str) -> Result<()> {
        let merge_err = |cause: String| Error::Merge {
            branch: branch.to_string(),
            cause,
        };

        let repo = self.lock_repo()?;
        let branch_ref = repo
            .find_branch(branch, BranchType::Local)
            .map_err(|e| merge_err(e.to_string()))?;
        let theirs = branch_ref
            .get()
            .peel_to_commit()
            .map_err(|e| merge_err(e.to_string()))?;
        let ours = head_commit(&repo)?
            .ok_or_else(|| merge_err("repository has no commits".to_string()))?;

        let mut merged = repo
            .merge_commits(&ours, &theirs, None)
            .map_err(|e| merge_err(e.to_string()))?;
        if merged.has_conflicts() {
            let conflicts = merged
                .conflicts()
                .map_err(|e| merge_err(e.to_string()))?
                .count();
            return Err(merge_err(format!("{conflicts} conflicting paths")));
        }

        let tree_oid = merged
            .write_tree_to(&repo)
            .map_err(|e| merge_err(e.to_string()))?;
        let tree = repo
            .find_tree(tree_oid)
            .map_err(|e| merge_err(e.to_string()))?;
        let sig = signature()?;
        repo.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &format!("Merge branch '{branch}'"),
            &tree,
            &[&ours, &theirs],
        )
        .map_err(|e| merge_err(e.to_string()))?;

        // Bring the worktree in line with the merged tree so later pattern
        // searches see the merged documents.
        repo.checkout_head(Some(CheckoutBuilder::new().force()))
            .map_err(|e| merge_err(e.to_string()))?;
        Ok(())
    }
}

impl StorageBackend for DiskBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn store(&self, document: &Document) -> Result<String> {
        let start = Instant::now();
        let result = self.store_inner(document);
        record_operation(NAME, "store", start, status_of(&result));
        result
    }

    fn get(&self, id: &DocumentId) -> Result<Document> {
        let start = Instant::now();
        let result = self.get_inner(id);
        record_operation(NAME, "get", start, status_of(&result));
        result
    }

    fn merge_branch(&self, branch: &str) -> Result<()> {
        let start = Instant::now();
        let result = self.merge_branch_inner(branch);
        record_operation(NAME, "merge_branch", start, status_of(&result));
        result
    }

    fn health(&self) -> Result<()> {
        let start = Instant::now();
        let result = if self.root.exists() {
            self.lock_repo().and_then(|repo| {
                repo.odb()
                    .map(|_| ())
                    .map_err(|e| Error::BackendUnavailable {
                        backend: NAME,
                        cause: e.to_string(),
                    })
            })
        } else {
            Err(Error::BackendUnavailable {
                backend: NAME,
                cause: format!("storage root missing: {}", self.root.display()),
            })
        };
        record_operation(NAME, "health", start, status_of(&result));
        result
    }

    fn document_ids(&self) -> Result<Vec<DocumentId>> {
        Ok(super::ids_from_tree_paths(&self.tree_paths()?))
    }

    fn tree_paths(&self) -> Result<Vec<String>> {
        let repo = self.lock_repo()?;
        match head_tree(&repo)? {
            Some(tree) => collect_tree_paths(&tree),
            None => Ok(Vec::new()),
        }
    }

    fn read_path(&self, path: &str) -> Result<Vec<u8>> {
        let repo = self.lock_repo()?;
        let tree = head_tree(&repo)?.ok_or_else(|| Error::NotFound(path.to_string()))?;
        read_blob(&repo, &tree, path)
    }

    fn commit_messages(&self, limit: usize) -> Result<Vec<String>> {
        let repo = self.lock_repo()?;
        commit_messages(&repo, limit)
    }
}

/// Builds the glob set covering every directory-depth convention a document
/// may live under.
fn metadata_globs(id: &str) -> Result<GlobSet> {
    let patterns = [
        // Flat and sharded-by-id layouts.
        format!("documents/{id}/{METADATA_FILE}"),
        format!("documents/??/{id}/{METADATA_FILE}"),
        format!("documents/??/??/{id}/{METADATA_FILE}"),
        // Partitioned-by-date layout: <type>/<yyyy>/<mm>.
        format!("documents/*/*/*/{id}/{METADATA_FILE}"),
    ];

    let mut builder = GlobSetBuilder::new();
    for pattern in &patterns {
        builder.add(Glob::new(pattern).map_err(|e| Error::operation("build_glob", e))?);
    }
    builder
        .build()
        .map_err(|e| Error::operation("build_globset", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Content, Source};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_backend() -> (TempDir, DiskBackend) {
        let dir = TempDir::new().unwrap();
        let backend = DiskBackend::open(dir.path().join("repo")).unwrap();
        (dir, backend)
    }

    fn test_document(id: &str) -> Document {
        Document {
            id: DocumentId::new(id),
            source: Source {
                source_type: "PubMed".to_string(),
                url: Some("https://pubmed.ncbi.nlm.nih.gov/12345".to_string()),
                path: None,
            },
            content: Content {
                raw: None,
                text: "A study of storage substrates".to_string(),
                metadata: HashMap::from([("author".to_string(), "Doe".to_string())]),
                embeddings: None,
            },
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_store_and_get_roundtrip() {
        let (_dir, backend) = create_backend();
        let doc = test_document("pm12345");

        let commit_id = backend.store(&doc).unwrap();
        assert!(!commit_id.is_empty());

        let retrieved = backend.get(&doc.id).unwrap();
        assert_eq!(retrieved.id, doc.id);
        assert_eq!(retrieved.content.text, doc.content.text);
        assert_eq!(retrieved.content.metadata, doc.content.metadata);
    }

    #[test]
    fn test_store_leaves_disk_visible_audit_trail() {
        let (_dir, backend) = create_backend();
        let doc = test_document("pm12345");
        backend.store(&doc).unwrap();

        let expected = backend
            .root()
            .join("documents/PubMed/2024/06/pm12345/metadata.json");
        assert!(expected.exists());
    }

    #[test]
    fn test_get_finds_sharded_layout_too() {
        let (_dir, backend) = create_backend();

        // Lay a document out sharded-by-id, as the embedded variant would.
        let doc = test_document("abcd1234");
        let dir = backend.root().join("documents/ab/cd/abcd1234");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_vec(&doc.metadata_file()).unwrap(),
        )
        .unwrap();
        fs::write(dir.join(CONTENT_FILE), doc.content.text.as_bytes()).unwrap();

        let retrieved = backend.get(&doc.id).unwrap();
        assert_eq!(retrieved.id, doc.id);
    }

    #[test]
    fn test_get_missing_returns_not_found() {
        let (_dir, backend) = create_backend();
        assert!(matches!(
            backend.get(&DocumentId::new("nothing")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_get_unsafe_id_is_not_found() {
        let (_dir, backend) = create_backend();
        assert!(matches!(
            backend.get(&DocumentId::new("../escape")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_health_reports_missing_root() {
        let (_dir, backend) = create_backend();
        assert!(backend.health().is_ok());

        let missing = DiskBackend {
            repo: Mutex::new(Repository::init(_dir.path().join("other")).unwrap()),
            root: PathBuf::from("/nonexistent/docvault"),
        };
        assert!(matches!(
            missing.health(),
            Err(Error::BackendUnavailable { backend: "disk", .. })
        ));
    }

    #[test]
    fn test_document_ids_from_commits() {
        let (_dir, backend) = create_backend();
        backend.store(&test_document("one1")).unwrap();
        backend.store(&test_document("two2")).unwrap();

        let mut ids: Vec<String> = backend
            .document_ids()
            .unwrap()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["one1", "two2"]);
    }

    #[test]
    fn test_commit_messages_newest_first() {
        let (_dir, backend) = create_backend();
        backend.store(&test_document("one1")).unwrap();
        backend.store(&test_document("two2")).unwrap();

        let messages = backend.commit_messages(10).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("two2"));
        assert!(messages[1].contains("one1"));
    }
}
