#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use camino::Utf8PathBuf;
use futures::stream;
use futures::StreamExt;
use longship_core::{EntryKind, ManifestEntry, RemoteManifest, ScanStatus};
use longship_infra::checksum_bytes;
use longship_pipeline::{RemoteBody, RemoteSource, SyncError, SyncEvent};

/// In-memory server with request counters.
#[derive(Default)]
pub struct FakeRemote {
    statuses: Mutex<VecDeque<ScanStatus>>,
    pub entries: Vec<ManifestEntry>,
    files: HashMap<String, Vec<u8>>,
    links: HashMap<String, String>,
    pub manifest_fetches: AtomicUsize,
    pub file_fetches: AtomicUsize,
    pub link_fetches: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses returned by successive manifest fetches; `Completed` once exhausted.
    pub fn with_statuses(mut self, statuses: &[ScanStatus]) -> Self {
        self.statuses = Mutex::new(statuses.iter().copied().collect());
        self
    }

    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        self.entries.push(ManifestEntry {
            relative_path: path.into(),
            kind: EntryKind::File,
            content_hash: checksum_bytes(data),
        });
        self.files.insert(path.into(), data.to_vec());
        self
    }

    /// Publish `claimed` as the digest but serve `served`.
    pub fn lying_file(mut self, path: &str, claimed: &[u8], served: &[u8]) -> Self {
        self.entries.push(ManifestEntry {
            relative_path: path.into(),
            kind: EntryKind::File,
            content_hash: checksum_bytes(claimed),
        });
        self.files.insert(path.into(), served.to_vec());
        self
    }

    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(ManifestEntry {
            relative_path: path.into(),
            kind: EntryKind::Directory,
            content_hash: String::new(),
        });
        self
    }

    pub fn link(mut self, path: &str, target: &str) -> Self {
        self.entries.push(ManifestEntry {
            relative_path: path.into(),
            kind: EntryKind::Symlink,
            content_hash: checksum_bytes(target.as_bytes()),
        });
        self.links.insert(path.into(), target.into());
        self
    }

    /// Raw entry, used for hostile paths.
    pub fn entry(mut self, path: &str, kind: EntryKind) -> Self {
        self.entries.push(ManifestEntry {
            relative_path: path.into(),
            kind,
            content_hash: String::new(),
        });
        self
    }

    pub fn fetched_files(&self) -> usize {
        self.file_fetches.load(Ordering::SeqCst)
    }

    pub fn fetched_manifests(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    pub fn fetched_links(&self) -> usize {
        self.link_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteSource for FakeRemote {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, SyncError> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScanStatus::Completed);
        Ok(RemoteManifest {
            status,
            entries: self.entries.clone(),
        })
    }

    async fn open_file(&self, relative_path: &str) -> Result<RemoteBody, SyncError> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        let data = self
            .files
            .get(relative_path)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("404 {relative_path}")))?;
        // Split into small chunks so streaming writes are exercised.
        let chunks: Vec<Result<Bytes, SyncError>> = data
            .chunks(3)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn fetch_link_target(&self, relative_path: &str) -> Result<String, SyncError> {
        self.link_fetches.fetch_add(1, Ordering::SeqCst);
        self.links
            .get(relative_path)
            .cloned()
            .ok_or_else(|| SyncError::Network(format!("404 {relative_path}")))
    }
}

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("game")).unwrap();
    (dir, root)
}

pub fn drain(rx: &mut tokio::sync::mpsc::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

/// Every file under `root`, relative, sorted.
pub fn list_tree(root: &camino::Utf8Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    out.sort();
    out
}
