use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use futures::StreamExt;
use longship_core::path_utils::LongshipPath;
use longship_core::{EntryKind, ManifestEntry};
use longship_infra::{compute_file_checksum, StreamingChecksum};
use longship_persistence::BlobCache;
use longship_scanner::Scanner;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::io_utils::{copy_hashing, remove_entry, robust_rename};
use crate::sync::remote::RemoteSource;
use crate::sync::SyncError;

const PART_SUFFIX: &str = ".longship-part";

/// A manifest entry that passed pre-flight validation.
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub relative_path: String,
    pub local: Utf8PathBuf,
    pub kind: EntryKind,
    pub content_hash: String,
}

/// Validate every entry against `root` before anything is written.
pub fn resolve_entries(
    root: &Utf8Path,
    entries: &[ManifestEntry],
) -> Result<Vec<ResolvedEntry>, SyncError> {
    entries
        .iter()
        .map(|entry| {
            let rel = LongshipPath::normalize(&entry.relative_path);
            let local = LongshipPath::resolve_within(root.as_std_path(), &rel)
                .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
                .ok_or_else(|| SyncError::Path(entry.relative_path.clone()))?;
            Ok(ResolvedEntry {
                relative_path: rel,
                local,
                kind: entry.kind,
                content_hash: entry.content_hash.to_ascii_lowercase(),
            })
        })
        .collect()
}

/// Refuse paths whose existing ancestors are symlinks leading outside `canonical_root`.
pub(crate) fn ensure_contained(
    root: &Utf8Path,
    canonical_root: &Path,
    local: &Utf8Path,
) -> Result<(), SyncError> {
    let Ok(rel) = local.strip_prefix(root) else {
        return Err(SyncError::Path(local.to_string()));
    };
    let mut cursor = root.to_path_buf();
    let mut components = rel.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            // The entry itself is replaced, never followed.
            break;
        }
        cursor.push(component);
        match std::fs::symlink_metadata(&cursor) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = std::fs::canonicalize(&cursor)
                    .map_err(|_| SyncError::Path(local.to_string()))?;
                if !resolved.starts_with(canonical_root) {
                    return Err(SyncError::Path(format!(
                        "{} leads outside the game directory via {}",
                        rel, cursor
                    )));
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(SyncError::Local(format!("stat {cursor}: {e}"))),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Skipped,
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Cache,
    Network,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryResult {
    pub outcome: EntryOutcome,
    pub source: Option<ContentSource>,
    pub cache_write_failed: bool,
}

impl EntryResult {
    fn skipped() -> Self {
        Self {
            outcome: EntryOutcome::Skipped,
            source: None,
            cache_write_failed: false,
        }
    }

    fn done(existed: bool) -> Self {
        Self {
            outcome: if existed {
                EntryOutcome::Updated
            } else {
                EntryOutcome::Created
            },
            source: None,
            cache_write_failed: false,
        }
    }
}

/// Brings single entries in line with the manifest.
pub struct EntryExecutor<'a> {
    pub root: &'a Utf8Path,
    pub canonical_root: PathBuf,
    pub remote: &'a dyn RemoteSource,
    pub cache: Option<Arc<dyn BlobCache>>,
}

fn local_err(action: &str, path: &Utf8Path, e: impl std::fmt::Display) -> SyncError {
    SyncError::Local(format!("{action} {path}: {e}"))
}

async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Local(format!("background task failed: {e}")))
}

async fn symlink_meta(path: &Utf8Path) -> Result<Option<std::fs::Metadata>, SyncError> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(m) => Ok(Some(m)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(local_err("stat", path, e)),
    }
}

impl EntryExecutor<'_> {
    pub async fn reconcile(&self, entry: &ResolvedEntry) -> Result<EntryResult, SyncError> {
        ensure_contained(self.root, &self.canonical_root, &entry.local)?;
        match entry.kind {
            EntryKind::Directory => self.sync_directory(entry).await,
            EntryKind::File => self.sync_file(entry).await,
            EntryKind::Symlink => self.sync_symlink(entry).await,
        }
    }

    async fn sync_directory(&self, entry: &ResolvedEntry) -> Result<EntryResult, SyncError> {
        let existed = match symlink_meta(&entry.local).await? {
            Some(m) if m.is_dir() => return Ok(EntryResult::skipped()),
            Some(_) => {
                remove_entry(entry.local.as_std_path())
                    .await
                    .map_err(|e| local_err("remove", &entry.local, e))?;
                true
            }
            None => false,
        };
        tokio::fs::create_dir_all(&entry.local)
            .await
            .map_err(|e| local_err("create directory", &entry.local, e))?;
        Ok(EntryResult::done(existed))
    }

    async fn sync_file(&self, entry: &ResolvedEntry) -> Result<EntryResult, SyncError> {
        let existed = match symlink_meta(&entry.local).await? {
            Some(m) if m.is_file() => {
                let path = entry.local.clone();
                let current = blocking(move || compute_file_checksum(&path))
                    .await?
                    .map_err(|e| SyncError::Local(e.to_string()))?;
                if !entry.content_hash.is_empty()
                    && current.eq_ignore_ascii_case(&entry.content_hash)
                {
                    return Ok(EntryResult::skipped());
                }
                true
            }
            Some(_) => {
                remove_entry(entry.local.as_std_path())
                    .await
                    .map_err(|e| local_err("remove", &entry.local, e))?;
                true
            }
            None => false,
        };

        if let Some(parent) = entry.local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| local_err("create directory", parent, e))?;
        }
        let part = part_path(&entry.local);

        let mut result = EntryResult::done(existed);
        if self.fill_from_cache(entry, &part).await? {
            result.source = Some(ContentSource::Cache);
        } else {
            self.fill_from_network(entry, &part).await?;
            result.source = Some(ContentSource::Network);
        }

        robust_rename(&part, &entry.local).await.map_err(|e| {
            let _ = std::fs::remove_file(&part);
            local_err("rename into", &entry.local, e)
        })?;

        if result.source == Some(ContentSource::Network) {
            result.cache_write_failed = !self.offer_to_cache(entry).await;
        }
        Ok(result)
    }

    /// Copy a verified cache blob into `part`. False when there is no usable blob.
    async fn fill_from_cache(&self, entry: &ResolvedEntry, part: &Utf8Path) -> Result<bool, SyncError> {
        let Some(cache) = self.cache.clone() else {
            return Ok(false);
        };
        if entry.content_hash.is_empty() || cache.lookup(&entry.content_hash).is_none() {
            return Ok(false);
        }
        let digest = entry.content_hash.clone();
        let blob = match blocking(move || cache.verified_blob(&digest)).await? {
            Ok(Some(blob)) => blob,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("cache lookup for {} failed: {}", entry.relative_path, e);
                return Ok(false);
            }
        };

        let dest = part.to_path_buf();
        let copied = blocking(move || copy_hashing(blob.as_std_path(), dest.as_std_path())).await?;
        match copied {
            Ok(actual) if actual == entry.content_hash => {
                debug!("{} served from cache", entry.relative_path);
                Ok(true)
            }
            Ok(actual) => {
                warn!(
                    "cache blob for {} changed during copy ({}), falling back to network",
                    entry.relative_path, actual
                );
                let _ = tokio::fs::remove_file(part).await;
                Ok(false)
            }
            Err(e) => {
                warn!("cache copy for {} failed: {}", entry.relative_path, e);
                let _ = tokio::fs::remove_file(part).await;
                Ok(false)
            }
        }
    }

    /// Stream the remote bytes into `part`, hashing as they are written.
    async fn fill_from_network(&self, entry: &ResolvedEntry, part: &Utf8Path) -> Result<(), SyncError> {
        let written = self.download_to(entry, part).await;
        let actual = match written {
            Ok(actual) => actual,
            Err(e) => {
                let _ = tokio::fs::remove_file(part).await;
                return Err(e);
            }
        };

        if entry.content_hash.is_empty() {
            warn!("{} has no published digest; accepting download as is", entry.relative_path);
            return Ok(());
        }
        if !actual.eq_ignore_ascii_case(&entry.content_hash) {
            let _ = tokio::fs::remove_file(part).await;
            return Err(SyncError::Integrity {
                path: entry.relative_path.clone(),
                expected: entry.content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    async fn download_to(&self, entry: &ResolvedEntry, part: &Utf8Path) -> Result<String, SyncError> {
        let mut body = self.remote.open_file(&entry.relative_path).await?;
        let file = tokio::fs::File::create(part)
            .await
            .map_err(|e| local_err("create", part, e))?;
        let mut out = tokio::io::BufWriter::new(file);
        let mut hasher = StreamingChecksum::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            out.write_all(&chunk)
                .await
                .map_err(|e| local_err("write", part, e))?;
        }
        out.flush().await.map_err(|e| local_err("flush", part, e))?;
        out.into_inner()
            .sync_all()
            .await
            .map_err(|e| local_err("sync", part, e))?;
        debug!(
            "downloaded {} ({} bytes)",
            entry.relative_path,
            hasher.len()
        );
        Ok(hasher.finish())
    }

    /// Store a freshly downloaded file in the cache. False only when a write was attempted
    /// and failed.
    async fn offer_to_cache(&self, entry: &ResolvedEntry) -> bool {
        let Some(cache) = self.cache.clone() else {
            return true;
        };
        if entry.content_hash.is_empty() || cache.lookup(&entry.content_hash).is_some() {
            return true;
        }
        let digest = entry.content_hash.clone();
        let local = entry.local.clone();
        let stored = blocking(move || {
            let mut f = std::fs::File::open(&local).map_err(|e| e.to_string())?;
            cache
                .put(&digest, &mut f, EntryKind::File)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r);
        match stored {
            Ok(_) => true,
            Err(e) => {
                let err = SyncError::CacheWrite(e);
                warn!("{}: {}", entry.relative_path, err);
                false
            }
        }
    }

    async fn sync_symlink(&self, entry: &ResolvedEntry) -> Result<EntryResult, SyncError> {
        let existing = symlink_meta(&entry.local).await?;
        let is_link = existing
            .as_ref()
            .is_some_and(|m| m.file_type().is_symlink());

        if is_link && !entry.content_hash.is_empty() {
            let path = entry.local.clone();
            if let Ok(Ok(current)) = blocking(move || Scanner::link_digest(&path)).await {
                if current == entry.content_hash {
                    return Ok(EntryResult::skipped());
                }
            }
        }

        let target = self.remote.fetch_link_target(&entry.relative_path).await?;
        if is_link {
            if let Ok(current) = tokio::fs::read_link(&entry.local).await {
                if current.as_os_str() == target.as_str() {
                    return Ok(EntryResult::skipped());
                }
            }
        }

        if existing.is_some() {
            remove_entry(entry.local.as_std_path())
                .await
                .map_err(|e| local_err("remove", &entry.local, e))?;
        }
        if let Some(parent) = entry.local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| local_err("create directory", parent, e))?;
        }
        create_symlink(&target, &entry.local)
            .await
            .map_err(|e| local_err("create symlink", &entry.local, e))?;
        Ok(EntryResult::done(existing.is_some()))
    }
}

fn part_path(local: &Utf8Path) -> Utf8PathBuf {
    let name = local.file_name().unwrap_or("download");
    local.with_file_name(format!("{name}{PART_SUFFIX}"))
}

#[cfg(unix)]
async fn create_symlink(target: &str, link: &Utf8Path) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &str, link: &Utf8Path) -> io::Result<()> {
    let resolved = link
        .parent()
        .map(|p| p.join(target))
        .unwrap_or_else(|| Utf8PathBuf::from(target));
    if resolved.is_dir() {
        tokio::fs::symlink_dir(target, link).await
    } else {
        tokio::fs::symlink_file(target, link).await
    }
}
