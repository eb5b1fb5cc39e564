use std::io::Read;

use camino::Utf8PathBuf;
use longship_core::{EntryKind, Md5Digest};
use serde::{Deserialize, Serialize};

pub const INDEX_FILENAME: &str = "longship-cache.json";

/// One cached blob. Keyed by digest in the index, so at most one record per digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRecord {
    #[serde(rename = "hash")]
    pub content_hash: Md5Digest,
    /// Blob location relative to the cache root.
    pub relative_path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Unix seconds of the last put or rebuild that saw this blob.
    #[serde(default)]
    pub last_seen: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub records: usize,
    pub bytes: u64,
}

/// Content-addressed blob cache consulted by the reconciler before the network.
///
/// Implementations serialise their own mutations; callers may share one behind `Arc`.
pub trait BlobCache: Send + Sync {
    fn lookup(&self, digest: &str) -> Option<CacheRecord>;

    /// Blob path for `digest`, only if it still exists and re-hashes to `digest`.
    fn verified_blob(&self, digest: &str) -> Result<Option<Utf8PathBuf>, crate::StorageError>;

    /// Store the bytes of `reader` under `digest`. Refuses bytes that hash to anything
    /// else.
    fn put(
        &self,
        digest: &str,
        reader: &mut dyn Read,
        kind: EntryKind,
    ) -> Result<CacheRecord, crate::StorageError>;
}
