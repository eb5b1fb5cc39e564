use std::collections::HashSet;
use std::sync::Arc;

use camino::Utf8Path;
use longship_core::path_utils::LongshipPath;
use longship_core::{plan, ManifestEntry, RemoteManifest, ScanStatus, SyncPlan};
use longship_persistence::BlobCache;
use longship_scanner::{Scanner, WalkOptions};
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::io_utils::remove_entry;
use crate::sync::execute::{
    ensure_contained, resolve_entries, ContentSource, EntryExecutor, EntryOutcome,
};
use crate::sync::remote::RemoteSource;
use crate::sync::retry::{wait_backoff, StatusDecision};
use crate::sync::{emit, SyncError, SyncEvent, SyncPhase, SyncReport, SyncRequest};
use crate::tracker::SyncProgress;

pub struct DefaultSyncEngine {
    remote: Arc<dyn RemoteSource>,
    cache: Option<Arc<dyn BlobCache>>,
}

impl DefaultSyncEngine {
    pub fn new(remote: Arc<dyn RemoteSource>, cache: Option<Arc<dyn BlobCache>>) -> Self {
        Self { remote, cache }
    }

    pub async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError> {
        self.remote.fetch_manifest().await
    }

    /// Dry run: compare the current manifest with a hashed walk of the local tree.
    pub async fn plan(&self, req: &SyncRequest) -> Result<SyncPlan, SyncError> {
        let manifest = self.remote.fetch_manifest().await?;
        if manifest.status != ScanStatus::Completed {
            return Err(SyncError::ManifestUnavailable(manifest.status));
        }

        let root = req.local_root.clone();
        let local = if root.exists() {
            tokio::task::spawn_blocking(move || Scanner::walk(&root, WalkOptions::hashed()))
                .await
                .map_err(|e| SyncError::Local(format!("scan task failed: {e}")))??
        } else {
            Vec::new()
        };

        Ok(plan(
            &manifest.entries,
            &local,
            &req.options.deletable_prefixes,
        ))
    }

    /// Full cycle: fetch, retry while the server is scanning, reconcile, sweep.
    pub async fn run(
        &self,
        req: &SyncRequest,
        progress: Arc<SyncProgress>,
        events: Option<Sender<SyncEvent>>,
        cancel: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let res = self
            .run_attempts(req, &progress, events.as_ref(), &cancel)
            .await;
        match &res {
            Ok(report) => {
                info!(
                    "sync finished: {} entries, {} changed, {} deleted",
                    report.total,
                    report.created + report.updated,
                    report.deleted
                );
                emit(events.as_ref(), SyncEvent::Phase(SyncPhase::Done));
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!("sync cancelled");
                } else {
                    warn!("sync failed: {e}");
                }
                emit(events.as_ref(), SyncEvent::Phase(SyncPhase::Aborted));
            }
        }
        res
    }

    async fn run_attempts(
        &self,
        req: &SyncRequest,
        progress: &SyncProgress,
        events: Option<&Sender<SyncEvent>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let policy = req.options.retry;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            attempt += 1;
            emit(events, SyncEvent::Phase(SyncPhase::FetchingManifest));
            let manifest = self.remote.fetch_manifest().await?;

            match policy.decide(manifest.status, attempt) {
                StatusDecision::Proceed => {
                    return self
                        .reconcile(req, &manifest.entries, progress, events, cancel)
                        .await;
                }
                StatusDecision::RetryAfter(delay) => {
                    info!(
                        "server is scanning, retrying in {:?} ({}/{})",
                        delay, attempt, policy.max_attempts
                    );
                    emit(events, SyncEvent::Phase(SyncPhase::Retrying));
                    emit(
                        events,
                        SyncEvent::Retrying {
                            attempt,
                            max_attempts: policy.max_attempts,
                        },
                    );
                    wait_backoff(delay, cancel).await?;
                }
                StatusDecision::Abort(e) => return Err(e),
            }
        }
    }

    /// One pass over a completed manifest.
    pub async fn reconcile(
        &self,
        req: &SyncRequest,
        entries: &[ManifestEntry],
        progress: &SyncProgress,
        events: Option<&Sender<SyncEvent>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let root = req.local_root.as_path();

        // Nothing is touched unless every entry is safe.
        let resolved = resolve_entries(root, entries)?;

        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| SyncError::Local(format!("create {root}: {e}")))?;
        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| SyncError::Local(format!("canonicalize {root}: {e}")))?;

        let executor = EntryExecutor {
            root,
            canonical_root: canonical_root.clone(),
            remote: self.remote.as_ref(),
            cache: self.cache.clone(),
        };

        progress.reset(resolved.len());
        let mut report = SyncReport {
            total: resolved.len(),
            ..SyncReport::default()
        };
        emit(events, SyncEvent::Phase(SyncPhase::Syncing));

        for entry in &resolved {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let result = executor.reconcile(entry).await.inspect_err(|e| {
                warn!("{} failed: {}", entry.relative_path, e);
            })?;
            match result.outcome {
                EntryOutcome::Skipped => report.skipped += 1,
                EntryOutcome::Created => report.created += 1,
                EntryOutcome::Updated => report.updated += 1,
            }
            match result.source {
                Some(ContentSource::Cache) => report.cache_hits += 1,
                Some(ContentSource::Network) => report.network_fetches += 1,
                None => {}
            }
            if result.cache_write_failed {
                report.cache_write_failures += 1;
            }

            let snap = progress.advance();
            debug!(
                "[{}/{}] {} {:?}",
                snap.current, snap.total, entry.relative_path, result.outcome
            );
            emit(
                events,
                SyncEvent::EntrySynced {
                    relative_path: entry.relative_path.clone(),
                    current: snap.current,
                    total: snap.total,
                },
            );
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        emit(events, SyncEvent::Phase(SyncPhase::Sweeping));
        report.deleted = self
            .sweep(root, &canonical_root, entries, &req.options.deletable_prefixes)
            .await?;
        Ok(report)
    }

    /// Remove unlisted local entries under the allow-listed prefixes.
    async fn sweep(
        &self,
        root: &Utf8Path,
        canonical_root: &std::path::Path,
        entries: &[ManifestEntry],
        prefixes: &[String],
    ) -> Result<usize, SyncError> {
        let mut listed = HashSet::new();
        for entry in entries {
            let key = LongshipPath::canonicalize(&entry.relative_path);
            for parent in LongshipPath::ancestors(&key) {
                listed.insert(parent.to_string());
            }
            listed.insert(key);
        }

        let walk_root = root.to_path_buf();
        let local = tokio::task::spawn_blocking(move || {
            Scanner::walk(&walk_root, WalkOptions::paths_only())
        })
        .await
        .map_err(|e| SyncError::Local(format!("sweep walk failed: {e}")))??;

        let mut removed: Vec<String> = Vec::new();
        for entry in local {
            let rel = &entry.relative_path;
            if listed.contains(&LongshipPath::canonicalize(rel)) {
                continue;
            }
            if !prefixes.iter().any(|p| LongshipPath::is_under_prefix(rel, p)) {
                continue;
            }
            if removed.iter().any(|r| LongshipPath::is_under_prefix(rel, r)) {
                continue;
            }

            let path = LongshipPath::resolve_within(root.as_std_path(), rel)
                .ok_or_else(|| SyncError::Path(rel.clone()))?;
            let path = camino::Utf8PathBuf::from_path_buf(path)
                .map_err(|p| SyncError::Path(p.to_string_lossy().into_owned()))?;
            ensure_contained(root, canonical_root, &path)?;

            info!("removing {}", rel);
            remove_entry(path.as_std_path())
                .await
                .map_err(|e| SyncError::Local(format!("remove {path}: {e}")))?;
            removed.push(entry.relative_path);
        }
        Ok(removed.len())
    }
}
