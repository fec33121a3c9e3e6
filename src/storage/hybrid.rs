//! Hybrid storage orchestrator.
//!
//! Composes the embedded and disk backend variants behind one capability,
//! adding timeout-bounded fallback and periodic best-effort reconciliation.
//! The availability contract is "at least one backend reachable": `health`
//! fails only when both variants report unhealthy.

use super::traits::StorageBackend;
use crate::models::{Document, DocumentId, QueryResult, StorageEvent};
use crate::observability::record_event;
use crate::query::{CancelToken, executor_for, parse_query};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Which backend variant serves requests first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimaryBackend {
    /// The embedded bare-repository variant.
    #[default]
    Embedded,
    /// The disk-resident worktree variant.
    Disk,
}

impl PrimaryBackend {
    /// Parses a primary backend name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disk" => Self::Disk,
            _ => Self::Embedded,
        }
    }
}

/// Configuration for the hybrid orchestrator.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Which variant is primary.
    pub primary: PrimaryBackend,
    /// Whether a primary failure is retried on the other variant.
    pub fallback_enabled: bool,
    /// Deadline applied to each backend call.
    pub operation_timeout: Duration,
    /// Whether successful writes are replicated to the other variant and
    /// the periodic reconciliation task runs.
    pub sync_enabled: bool,
    /// How often the reconciliation task runs.
    pub sync_interval: Duration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryBackend::Embedded,
            fallback_enabled: true,
            operation_timeout: Duration::from_secs(5),
            sync_enabled: false,
            sync_interval: Duration::from_secs(60),
        }
    }
}

impl HybridConfig {
    /// Sets the primary backend.
    #[must_use]
    pub const fn with_primary(mut self, primary: PrimaryBackend) -> Self {
        self.primary = primary;
        self
    }

    /// Enables or disables fallback.
    #[must_use]
    pub const fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Sets the per-call deadline.
    #[must_use]
    pub const fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Enables or disables replication and reconciliation.
    #[must_use]
    pub const fn with_sync(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Sets the reconciliation interval.
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }
}

/// Statistics from one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileStats {
    /// Documents copied to the primary backend.
    pub copied_to_primary: usize,
    /// Documents copied to the secondary backend.
    pub copied_to_secondary: usize,
}

impl ReconcileStats {
    /// Returns true if the pass was a no-op.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.copied_to_primary == 0 && self.copied_to_secondary == 0
    }
}

/// Orchestrator over two independently-failing backend variants.
pub struct HybridStorage {
    primary: Arc<dyn StorageBackend>,
    secondary: Arc<dyn StorageBackend>,
    config: HybridConfig,
}

impl HybridStorage {
    /// Creates a hybrid store over the embedded and disk variants, ordering
    /// them according to `config.primary`.
    #[must_use]
    pub fn new(
        embedded: Arc<dyn StorageBackend>,
        disk: Arc<dyn StorageBackend>,
        config: HybridConfig,
    ) -> Self {
        let (primary, secondary) = match config.primary {
            PrimaryBackend::Embedded => (embedded, disk),
            PrimaryBackend::Disk => (disk, embedded),
        };
        Self {
            primary,
            secondary,
            config,
        }
    }

    /// Returns the primary backend.
    #[must_use]
    pub fn primary(&self) -> &Arc<dyn StorageBackend> {
        &self.primary
    }

    /// Returns the secondary backend.
    #[must_use]
    pub fn secondary(&self) -> &Arc<dyn StorageBackend> {
        &self.secondary
    }

    /// Stores a document on the primary, falling back to the secondary on
    /// any primary failure when fallback is enabled.
    ///
    /// On success, when sync is enabled, the document is replicated to the
    /// other backend fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns the combined error when every eligible backend fails.
    pub async fn store(&self, document: &Document) -> Result<String> {
        let doc = document.clone();
        let primary_result = self
            .call_backend(Arc::clone(&self.primary), "store", {
                let doc = doc.clone();
                move |backend| backend.store(&doc)
            })
            .await;

        match primary_result {
            Ok(commit_id) => {
                record_outcome("store", "primary_success");
                self.replicate(Arc::clone(&self.secondary), doc);
                Ok(commit_id)
            },
            Err(primary_err) if self.config.fallback_enabled => {
                tracing::warn!(
                    backend = self.primary.name(),
                    error = %primary_err,
                    "primary store failed, trying fallback"
                );
                let fallback_result = self
                    .call_backend(Arc::clone(&self.secondary), "store", {
                        let doc = doc.clone();
                        move |backend| backend.store(&doc)
                    })
                    .await;

                match fallback_result {
                    Ok(commit_id) => {
                        record_outcome("store", "fallback_success");
                        self.replicate(Arc::clone(&self.primary), doc);
                        Ok(commit_id)
                    },
                    Err(fallback_err) => {
                        record_outcome("store", "both_failed");
                        Err(both_failed("store", &primary_err, &fallback_err))
                    },
                }
            },
            Err(primary_err) => {
                record_outcome("store", "both_failed");
                Err(primary_err)
            },
        }
    }

    /// Retrieves a document, falling back on any primary failure (including
    /// `NotFound`) when fallback is enabled.
    ///
    /// # Errors
    ///
    /// Returns the combined error when every eligible backend fails.
    pub async fn get(&self, id: &DocumentId) -> Result<Document> {
        let primary_result = self
            .call_backend(Arc::clone(&self.primary), "get", {
                let id = id.clone();
                move |backend| backend.get(&id)
            })
            .await;

        match primary_result {
            Ok(document) => {
                record_outcome("get", "primary_success");
                Ok(document)
            },
            Err(primary_err) if self.config.fallback_enabled => {
                tracing::debug!(
                    backend = self.primary.name(),
                    error = %primary_err,
                    "primary get failed, trying fallback"
                );
                let fallback_result = self
                    .call_backend(Arc::clone(&self.secondary), "get", {
                        let id = id.clone();
                        move |backend| backend.get(&id)
                    })
                    .await;

                match fallback_result {
                    Ok(document) => {
                        record_outcome("get", "fallback_success");
                        Ok(document)
                    },
                    Err(fallback_err) => {
                        record_outcome("get", "both_failed");
                        Err(both_failed("get", &primary_err, &fallback_err))
                    },
                }
            },
            Err(primary_err) => {
                record_outcome("get", "both_failed");
                Err(primary_err)
            },
        }
    }

    /// Reports healthy if at least one backend is healthy.
    ///
    /// # Errors
    ///
    /// Fails only when both backends report unhealthy, with both causes.
    pub async fn health(&self) -> Result<()> {
        let primary_result = self
            .call_backend(Arc::clone(&self.primary), "health", |b| b.health())
            .await;
        let Err(primary_err) = primary_result else {
            return Ok(());
        };

        let fallback_result = self
            .call_backend(Arc::clone(&self.secondary), "health", |b| b.health())
            .await;
        fallback_result.map_err(|fallback_err| both_failed("health", &primary_err, &fallback_err))
    }

    /// Parses and executes a GQL query against the primary backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryParse`] for malformed GQL or the executor's
    /// error.
    pub async fn query(&self, gql: &str) -> Result<QueryResult> {
        let query = parse_query(gql)?;
        let backend = Arc::clone(&self.primary);
        let cancel = CancelToken::new();
        tokio::task::spawn_blocking(move || executor_for(backend).execute(&query, &cancel))
            .await
            .map_err(|e| Error::operation("query", e))?
    }

    /// Spawns the periodic reconciliation task.
    ///
    /// Returns `None` when sync is disabled. The task never blocks
    /// foreground operations; sync is advisory, not a consistency
    /// guarantee.
    #[must_use]
    pub fn spawn_reconciliation(&self) -> Option<JoinHandle<()>> {
        if !self.config.sync_enabled {
            return None;
        }

        let primary = Arc::clone(&self.primary);
        let secondary = Arc::clone(&self.secondary);
        let interval = self.config.sync_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match reconcile_once(&primary, &secondary).await {
                    Ok(stats) if stats.is_empty() => {},
                    Ok(stats) => {
                        tracing::info!(
                            copied_to_primary = stats.copied_to_primary,
                            copied_to_secondary = stats.copied_to_secondary,
                            "reconciled backends"
                        );
                        record_event(StorageEvent::reconciled(
                            stats.copied_to_primary,
                            stats.copied_to_secondary,
                        ));
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "reconciliation pass failed");
                    },
                }
            }
        }))
    }

    /// Runs one backend call on the blocking pool under the operation
    /// deadline. A deadline exceeded is reported as [`Error::Timeout`] and
    /// treated identically to any other backend failure by the callers.
    async fn call_backend<T, F>(
        &self,
        backend: Arc<dyn StorageBackend>,
        operation: &'static str,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&dyn StorageBackend) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let name = backend.name();
        let timeout = self.config.operation_timeout;
        match tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || f(backend.as_ref())),
        )
        .await
        {
            Err(_elapsed) => Err(Error::Timeout {
                operation,
                backend: name,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(join_err)) => Err(Error::operation(operation, join_err)),
            Ok(Ok(result)) => result,
        }
    }

    /// Fire-and-forget replication of a stored document to the other
    /// backend. Failures are logged, never surfaced to the caller.
    fn replicate(&self, target: Arc<dyn StorageBackend>, document: Document) {
        if !self.config.sync_enabled {
            return;
        }

        tokio::spawn(async move {
            let backend = target.name();
            let id = document.id.clone();
            let result =
                tokio::task::spawn_blocking(move || target.store(&document)).await;
            let status = match result {
                Ok(Ok(commit_id)) => {
                    tracing::debug!(backend, id = %id, commit_id, "replicated document");
                    "success"
                },
                Ok(Err(err)) => {
                    tracing::warn!(backend, id = %id, error = %err, "replication failed");
                    "error"
                },
                Err(err) => {
                    tracing::warn!(backend, id = %id, error = %err, "replication task failed");
                    "error"
                },
            };
            metrics::counter!(
                "hybrid_replication_total",
                "backend" => backend,
                "status" => status
            )
            .increment(1);
        });
    }
}

/// Diffs the two backends' document ids and copies missing documents each
/// way. Per-document failures are logged and skipped; never holds a lock
/// across backend I/O (each call owns its own lock scope).
pub async fn reconcile_once(
    primary: &Arc<dyn StorageBackend>,
    secondary: &Arc<dyn StorageBackend>,
) -> Result<ReconcileStats> {
    let primary_ids = list_ids(Arc::clone(primary)).await?;
    let secondary_ids = list_ids(Arc::clone(secondary)).await?;

    let mut stats = ReconcileStats::default();
    for id in secondary_ids.difference(&primary_ids) {
        if copy_document(secondary, primary, id).await {
            stats.copied_to_primary += 1;
        }
    }
    for id in primary_ids.difference(&secondary_ids) {
        if copy_document(primary, secondary, id).await {
            stats.copied_to_secondary += 1;
        }
    }
    Ok(stats)
}

async fn list_ids(backend: Arc<dyn StorageBackend>) -> Result<HashSet<String>> {
    let ids = tokio::task::spawn_blocking(move || backend.document_ids())
        .await
        .map_err(|e| Error::operation("reconcile_list", e))??;
    Ok(ids.into_iter().map(|id| id.as_str().to_string()).collect())
}

async fn copy_document(
    from: &Arc<dyn StorageBackend>,
    to: &Arc<dyn StorageBackend>,
    id: &str,
) -> bool {
    let source = Arc::clone(from);
    let target = Arc::clone(to);
    let document_id = DocumentId::new(id);
    let result = tokio::task::spawn_blocking(move || {
        let document = source.get(&document_id)?;
        target.store(&document)
    })
    .await;

    match result {
        Ok(Ok(_)) => true,
        Ok(Err(err)) => {
            tracing::warn!(id, error = %err, "failed to reconcile document");
            false
        },
        Err(err) => {
            tracing::warn!(id, error = %err, "reconcile task failed");
            false
        },
    }
}

/// Records which path served an orchestrated operation.
fn record_outcome(operation: &'static str, outcome: &'static str) {
    metrics::counter!(
        "hybrid_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Aggregates both backends' errors into one combined error.
fn both_failed(operation: &str, primary_err: &Error, fallback_err: &Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("primary: {primary_err}; fallback: {fallback_err}"),
    }
}
