//! Embedded commit-log backend.
//!
//! The primary backend variant. Commits are built directly in the object
//! database of a bare repository: a document's `metadata.json`,
//! `content.txt`, and optional `raw` file are written as one indivisible
//! commit, so a reader never observes a partially-written document. Lookups
//! go through the in-memory [`DocumentIndex`] first and fall back to a
//! pattern search over both storage layouts.

use super::index::{CachedMetadata, DocumentIndex};
use super::metrics::{record_operation, status_of};
use super::traits::StorageBackend;
use crate::models::{
    CONTENT_FILE, Document, DocumentId, METADATA_FILE, MetadataFile, RAW_FILE, StorageEvent,
    date_partitioned_path, sharded_path,
};
use crate::observability::record_event;
use crate::{Error, Result};
use chrono::{Datelike, Utc};
use git2::{BranchType, Commit, ErrorCode, ObjectType, Repository, Signature, Tree};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Backend name used in logs, metrics, and events.
const NAME: &str = "embedded";

/// How many months back the date-partitioned fallback search scans.
const FALLBACK_MONTHS: usize = 12;

/// Committer identity for document commits.
const COMMITTER_NAME: &str = "docvault";
const COMMITTER_EMAIL: &str = "docvault@localhost";

/// Embedded bare-repository backend with an in-memory document index.
pub struct EmbeddedBackend {
    /// The bare repository. `git2::Repository` is not `Sync`, so every
    /// access goes through the mutex; document (de)serialization happens
    /// outside it where possible.
    repo: Mutex<Repository>,
    /// Id -> location cache, exclusively owned by this backend.
    index: DocumentIndex,
}

impl EmbeddedBackend {
    /// Opens (or initializes) the bare repository at `path` and rebuilds the
    /// document index from the current HEAD tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened or created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let repo = match Repository::open(&path) {
            Ok(repo) => repo,
            Err(_) => Repository::init_bare(&path)
                .map_err(|e| Error::operation("open_embedded_repo", e))?,
        };

        let backend = Self {
            repo: Mutex::new(repo),
            index: DocumentIndex::new(),
        };
        backend.rebuild_index()?;
        Ok(backend)
    }

    /// Rebuilds the document index from the current HEAD tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    pub fn rebuild_index(&self) -> Result<usize> {
        let paths = self.tree_paths()?;
        Ok(self.index.rebuild(&paths))
    }

    fn lock_repo(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo
            .lock()
            .map_err(|_| Error::operation("lock_repo", "repository lock poisoned"))
    }

    fn store_inner(&self, document: &Document) -> Result<String> {
        document.validate()?;

        let base = document.storage_path();
        let metadata_bytes = serde_json::to_vec_pretty(&document.metadata_file())
            .map_err(|e| Error::operation("serialize_metadata", e))?;

        let commit_id = {
            let repo = self.lock_repo()?;
            let mut tree_index = repo
                .index()
                .map_err(|e| Error::operation("open_git_index", e))?;

            // Start from the current tree so the commit carries the whole
            // corpus, then overlay this document's files.
            match head_tree(&repo)? {
                Some(tree) => tree_index
                    .read_tree(&tree)
                    .map_err(|e| Error::operation("read_head_tree", e))?,
                None => tree_index
                    .clear()
                    .map_err(|e| Error::operation("clear_git_index", e))?,
            }

            add_blob(&mut tree_index, &format!("{base}/{METADATA_FILE}"), &metadata_bytes)?;
            add_blob(
                &mut tree_index,
                &format!("{base}/{CONTENT_FILE}"),
                document.content.text.as_bytes(),
            )?;
            if let Some(raw) = &document.content.raw {
                add_blob(&mut tree_index, &format!("{base}/{RAW_FILE}"), raw)?;
            }

            let tree_oid = tree_index
                .write_tree()
                .map_err(|e| Error::operation("write_tree", e))?;
            let tree = repo
                .find_tree(tree_oid)
                .map_err(|e| Error::operation("find_tree", e))?;

            commit_tree(&repo, &tree, &document.commit_message())?
        };

        self.index.add(
            document.id.as_str(),
            base,
            Some(CachedMetadata {
                source_type: document.source.source_type.clone(),
                created_at: document.created_at,
                updated_at: document.updated_at,
            }),
        );

        // Best-effort notification; failure to publish never fails the store.
        record_event(StorageEvent::document_stored(
            document.id.clone(),
            commit_id.clone(),
            NAME,
        ));

        Ok(commit_id)
    }

    fn get_inner(&self, id: &DocumentId) -> Result<Document> {
        // Index hit first; a stale entry is evicted and we fall through to
        // the pattern search (IndexHit -> Verify -> Stale -> Evict ->
        // FallbackSearch).
        if let Some(path) = self.index.get(id.as_str()) {
            let repo = self.lock_repo()?;
            match read_document_at(&repo, &path) {
                Ok(doc) => return Ok(doc),
                Err(err) => {
                    drop(repo);
                    tracing::warn!(
                        id = %id,
                        path = %path,
                        error = %err,
                        "evicting stale index entry"
                    );
                    self.index.remove(id.as_str());
                },
            }
        }

        let repo = self.lock_repo()?;
        for base in candidate_paths(&repo, id.as_str())? {
            if let Ok(doc) = read_document_at(&repo, &base) {
                drop(repo);
                // A successful fallback hit is added back to the index.
                self.index.add(
                    id.as_str(),
                    base,
                    Some(CachedMetadata {
                        source_type: doc.source.source_type.clone(),
                        created_at: doc.created_at,
                        updated_at: doc.updated_at,
                    }),
                );
                return Ok(doc);
            }
        }

        Err(Error::NotFound(id.to_string()))
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
        drop(tree);
        drop(merged);
        drop(theirs);
        drop(ours);
        drop(branch_ref);
        drop(repo);

        // The merged tree may carry documents this instance has never seen.
        self.rebuild_index()?;
        Ok(())
    }
}

impl StorageBackend for EmbeddedBackend {
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
        let result = self
            .lock_repo()
            .and_then(|repo| {
                repo.odb()
                    .map(|_| ())
                    .map_err(|e| Error::BackendUnavailable {
                        backend: NAME,
                        cause: e.to_string(),
                    })
            });
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

    fn has_index(&self) -> bool {
        true
    }

    fn index(&self) -> Option<&DocumentIndex> {
        Some(&self.index)
    }
}

/// Returns the tree of HEAD, or `None` for an unborn branch.
pub(crate) fn head_tree(repo: &Repository) -> Result<Option<Tree<'_>>> {
    match repo.head() {
        Ok(head) => head
            .peel_to_tree()
            .map(Some)
            .map_err(|e| Error::operation("peel_head_tree", e)),
        Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(None)
        },
        Err(err) => Err(Error::operation("resolve_head", err)),
    }
}

/// Returns the commit of HEAD, or `None` for an unborn branch.
pub(crate) fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>> {
    match repo.head() {
        Ok(head) => head
            .peel_to_commit()
            .map(Some)
            .map_err(|e| Error::operation("peel_head_commit", e)),
        Err(err) if matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            Ok(None)
        },
        Err(err) => Err(Error::operation("resolve_head", err)),
    }
}

/// Commits `tree` onto HEAD with the given message, handling the first
/// commit of an unborn branch.
pub(crate) fn commit_tree(repo: &Repository, tree: &Tree<'_>, message: &str) -> Result<String> {
    let sig = signature()?;
    let parent = head_commit(repo)?;
    let parents: Vec<&Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(Some("HEAD"), &sig, &sig, message, tree, &parents)
        .map_err(|e| Error::operation("commit", e))?;
    Ok(oid.to_string())
}

pub(crate) fn signature() -> Result<Signature<'static>> {
    Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)
        .map_err(|e| Error::operation("create_signature", e))
}

/// Collects every blob path in a tree, in `root/name` form.
pub(crate) fn collect_tree_paths(tree: &Tree<'_>) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(ObjectType::Blob) {
            if let Some(name) = entry.name() {
                paths.push(format!("{root}{name}"));
            }
        }
        git2::TreeWalkResult::Ok
    })
    .map_err(|e| Error::operation("walk_tree", e))?;
    Ok(paths)
}

/// Reads one blob out of a tree.
pub(crate) fn read_blob(repo: &Repository, tree: &Tree<'_>, path: &str) -> Result<Vec<u8>> {
    let entry = tree
        .get_path(Path::new(path))
        .map_err(|_| Error::NotFound(path.to_string()))?;
    let blob = repo
        .find_blob(entry.id())
        .map_err(|e| Error::operation("read_blob", e))?;
    Ok(blob.content().to_vec())
}

/// Returns up to `limit` commit messages reachable from HEAD, newest first.
pub(crate) fn commit_messages(repo: &Repository, limit: usize) -> Result<Vec<String>> {
    if head_commit(repo)?.is_none() {
        return Ok(Vec::new());
    }

    let mut revwalk = repo
        .revwalk()
        .map_err(|e| Error::operation("revwalk", e))?;
    revwalk
        .push_head()
        .map_err(|e| Error::operation("revwalk_push_head", e))?;

    let mut messages = Vec::new();
    for oid in revwalk.take(limit) {
        let oid = oid.map_err(|e| Error::operation("revwalk_next", e))?;
        let commit = repo
            .find_commit(oid)
            .map_err(|e| Error::operation("find_commit", e))?;
        messages.push(commit.message().unwrap_or_default().to_string());
    }
    Ok(messages)
}

/// Reads a full document rooted at `base` in the HEAD tree.
fn read_document_at(repo: &Repository, base: &str) -> Result<Document> {
    let tree = head_tree(repo)?.ok_or_else(|| Error::NotFound(base.to_string()))?;

    let metadata_bytes = read_blob(repo, &tree, &format!("{base}/{METADATA_FILE}"))?;
    let metadata: MetadataFile = serde_json::from_slice(&metadata_bytes)
        .map_err(|e| Error::operation("parse_metadata", e))?;

    let text = read_blob(repo, &tree, &format!("{base}/{CONTENT_FILE}"))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    let raw = read_blob(repo, &tree, &format!("{base}/{RAW_FILE}")).ok();

    Ok(metadata.into_document(text, raw))
}

/// Builds the plausible storage locations for an unindexed id.
///
/// Covers the sharded-by-id layout plus the partitioned-by-date layout for
/// every source-type directory currently in the tree, scanning up to twelve
/// months back.
fn candidate_paths(repo: &Repository, id: &str) -> Result<Vec<String>> {
    let mut candidates = vec![sharded_path(id)];

    let Some(tree) = head_tree(repo)? else {
        return Ok(candidates);
    };
    let Ok(documents_entry) = tree.get_path(Path::new("documents")) else {
        return Ok(candidates);
    };
    let Ok(documents_obj) = documents_entry.to_object(repo) else {
        return Ok(candidates);
    };
    let Some(documents_tree) = documents_obj.as_tree() else {
        return Ok(candidates);
    };

    let source_types: Vec<String> = documents_tree
        .iter()
        .filter(|entry| entry.kind() == Some(ObjectType::Tree))
        .filter_map(|entry| entry.name().map(str::to_string))
        .collect();

    let now = Utc::now();
    for source_type in source_types {
        for (year, month) in recent_months(now.year(), now.month(), FALLBACK_MONTHS) {
            if let Some(date) = chrono::NaiveDate::from_ymd_opt(year, month, 1) {
                candidates.push(date_partitioned_path(&source_type, date, id));
            }
        }
    }

    Ok(candidates)
}

/// Yields `(year, month)` pairs walking backwards from the given month.
fn recent_months(mut year: i32, mut month: u32, count: usize) -> Vec<(i32, u32)> {
    let mut months = Vec::with_capacity(count);
    for _ in 0..count {
        months.push((year, month));
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    months
}

/// Adds one blob to a repository-backed git index.
fn add_blob(index: &mut git2::Index, path: &str, data: &[u8]) -> Result<()> {
    let entry = git2::IndexEntry {
        ctime: git2::IndexTime::new(0, 0),
        mtime: git2::IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: 0o100_644,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: git2::Oid::zero(),
        flags: 0,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    };
    index
        .add_frombuffer(&entry, data)
        .map_err(|e| Error::operation("add_blob", e))
}
