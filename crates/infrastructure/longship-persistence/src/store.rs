use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, Utc};
use longship_core::EntryKind;
use longship_infra::{compute_file_checksum, StreamingChecksum};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::{BlobCache, CacheRecord, CacheStats, INDEX_FILENAME};
use crate::codec::{decode_index, write_index_atomic, IndexDocument};
use crate::maintenance::{is_bookkeeping_file, quarantine_corrupt_file};
use crate::paths::normalize_rel_path;
use crate::StorageError;

const BLOB_PREFIX: &str = "lscache-";

/// Digest-keyed blob cache on disk.
///
/// Blobs live under `<root>/<YYYY-MM-DD>/lscache-<nanos>-<seq>`; names never derive from
/// server paths. The index is `<root>/longship-cache.json`, rewritten wholesale on every
/// change.
pub struct CacheStore {
    root: Utf8PathBuf,
    index_path: Utf8PathBuf,
    index: Mutex<IndexDocument>,
    seq: AtomicU64,
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn digest_key(digest: &str) -> String {
    digest.trim().to_ascii_lowercase()
}

impl CacheStore {
    pub fn open(cache_root: &Utf8Path) -> Result<Self, StorageError> {
        fs::create_dir_all(cache_root)?;
        let index_path = cache_root.join(INDEX_FILENAME);

        let doc = match fs::read(&index_path) {
            Ok(bytes) => match decode_index(&bytes) {
                Ok(doc) => sanitize(doc),
                Err(e) => {
                    warn!("cache index at {} unreadable: {}", index_path, e);
                    if let Some(moved) = quarantine_corrupt_file(&index_path)? {
                        warn!("quarantined cache index to {}", moved);
                    }
                    IndexDocument::fresh(now_ts())
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => IndexDocument::fresh(now_ts()),
            Err(e) => return Err(e.into()),
        };

        debug!(
            "opened cache at {} with {} records",
            cache_root,
            doc.files.len()
        );

        Ok(Self {
            root: cache_root.to_path_buf(),
            index_path,
            index: Mutex::new(doc),
            seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, IndexDocument> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn blob_path(&self, record: &CacheRecord) -> Result<Utf8PathBuf, StorageError> {
        Ok(self.root.join(normalize_rel_path(&record.relative_path)?))
    }

    pub fn lookup(&self, digest: &str) -> Option<CacheRecord> {
        self.lock().files.get(&digest_key(digest)).cloned()
    }

    pub fn verified_blob(&self, digest: &str) -> Result<Option<Utf8PathBuf>, StorageError> {
        let Some(record) = self.lookup(digest) else {
            return Ok(None);
        };
        let path = self.blob_path(&record)?;

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                warn!("cache blob {} is not a regular file", path);
                return Ok(None);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("cache blob {} vanished", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let actual = compute_file_checksum(&path)?;
        if !actual.eq_ignore_ascii_case(&record.content_hash) {
            warn!(
                "cache blob {} was modified: expected {}, found {}",
                path, record.content_hash, actual
            );
            return Ok(None);
        }
        Ok(Some(path))
    }

    pub fn put(
        &self,
        digest: &str,
        reader: &mut dyn Read,
        kind: EntryKind,
    ) -> Result<CacheRecord, StorageError> {
        let key = digest_key(digest);
        let day = Local::now().format("%Y-%m-%d").to_string();
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        let relative_path = format!("{day}/{BLOB_PREFIX}{nanos}-{n}");

        let final_path = self.root.join(&relative_path);
        let part_path = self.root.join(format!("{relative_path}.part"));
        fs::create_dir_all(self.root.join(&day))?;

        let actual = match copy_hashing(reader, &part_path) {
            Ok(actual) => actual,
            Err(e) => {
                let _ = fs::remove_file(&part_path);
                return Err(e.into());
            }
        };
        if actual != key {
            let _ = fs::remove_file(&part_path);
            return Err(StorageError::DigestMismatch {
                expected: key,
                actual,
            });
        }
        if let Err(e) = fs::rename(&part_path, &final_path) {
            let _ = fs::remove_file(&part_path);
            return Err(e.into());
        }

        let record = CacheRecord {
            content_hash: key.clone(),
            relative_path,
            kind,
            last_seen: now_ts(),
        };

        let mut current = self.lock();
        let mut next = current.clone();
        let replaced = next.files.insert(key, record.clone());
        next.mark_updated(record.last_seen);
        if let Err(e) = write_index_atomic(&self.index_path, &next) {
            let _ = fs::remove_file(&final_path);
            return Err(e);
        }
        *current = next;
        drop(current);

        if let Some(old) = replaced {
            if let Ok(old_path) = self.blob_path(&old) {
                let _ = fs::remove_file(old_path);
            }
        }
        debug!("cached {} at {}", record.content_hash, record.relative_path);
        Ok(record)
    }

    /// Re-index every blob under the root by its actual digest. Records whose blobs are
    /// gone are dropped. Returns the resulting stats.
    pub fn rebuild_index(&self) -> Result<CacheStats, StorageError> {
        let now = now_ts();
        let previous = self.lock().files.clone();
        let mut by_path: BTreeMap<String, CacheRecord> = previous
            .into_values()
            .map(|r| (r.relative_path.clone(), r))
            .collect();

        let mut files = BTreeMap::new();
        let mut bytes = 0u64;
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if is_bookkeeping_file(&name) {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                warn!("skipping non-UTF-8 cache entry {}", entry.path().display());
                continue;
            };
            let Ok(rel) = path.strip_prefix(&self.root) else {
                continue;
            };
            let rel = normalize_rel_path(rel.as_str())?;

            let digest = compute_file_checksum(path)?;
            let kind = by_path
                .remove(&rel)
                .map(|r| r.kind)
                .unwrap_or(EntryKind::File);
            if files.contains_key(&digest) {
                debug!("duplicate cache blob {} for {}", rel, digest);
                continue;
            }
            bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.insert(
                digest.clone(),
                CacheRecord {
                    content_hash: digest,
                    relative_path: rel,
                    kind,
                    last_seen: now,
                },
            );
        }

        let mut current = self.lock();
        let mut next = current.clone();
        next.files = files;
        next.mark_generated(now);
        write_index_atomic(&self.index_path, &next)?;
        let stats = CacheStats {
            records: next.files.len(),
            bytes,
        };
        *current = next;
        info!(
            "rebuilt cache index: {} records, {} bytes",
            stats.records, stats.bytes
        );
        Ok(stats)
    }

    pub fn stats(&self) -> CacheStats {
        let records: Vec<CacheRecord> = self.lock().files.values().cloned().collect();
        let bytes = records
            .iter()
            .filter_map(|r| self.blob_path(r).ok())
            .filter_map(|p| fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();
        CacheStats {
            records: records.len(),
            bytes,
        }
    }
}

/// Drop records that point outside the cache root or whose key disagrees with the
/// record's own digest.
fn sanitize(mut doc: IndexDocument) -> IndexDocument {
    doc.files.retain(|key, record| {
        if normalize_rel_path(&record.relative_path).is_err() {
            warn!(
                "dropping cache record {} with unsafe path {:?}",
                key, record.relative_path
            );
            return false;
        }
        key.eq_ignore_ascii_case(&record.content_hash)
    });
    doc
}

fn copy_hashing(reader: &mut dyn Read, dest: &Utf8Path) -> io::Result<String> {
    let mut out = io::BufWriter::new(fs::File::create(dest)?);
    let mut hasher = StreamingChecksum::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])?;
    }
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(hasher.finish())
}

impl BlobCache for CacheStore {
    fn lookup(&self, digest: &str) -> Option<CacheRecord> {
        CacheStore::lookup(self, digest)
    }

    fn verified_blob(&self, digest: &str) -> Result<Option<Utf8PathBuf>, StorageError> {
        CacheStore::verified_blob(self, digest)
    }

    fn put(
        &self,
        digest: &str,
        reader: &mut dyn Read,
        kind: EntryKind,
    ) -> Result<CacheRecord, StorageError> {
        CacheStore::put(self, digest, reader, kind)
    }
}
