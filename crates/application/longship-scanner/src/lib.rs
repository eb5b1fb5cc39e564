use camino::{Utf8Path, Utf8PathBuf};
use longship_core::path_utils::LongshipPath;
use longship_core::{EntryKind, LocalEntry};
use longship_infra::hashing::{checksum_bytes, compute_file_checksum, HashError};
use rayon::prelude::*;
use std::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Path outside scan root: {0}")]
    Path(String),
    #[error("Hashing error: {0}")]
    Hash(#[from] HashError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Compute content digests. Off for the deletion sweep, which only needs paths.
    pub with_hash: bool,
}

impl WalkOptions {
    pub fn hashed() -> Self {
        Self { with_hash: true }
    }

    pub fn paths_only() -> Self {
        Self { with_hash: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanStats {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub total_bytes: u64,
}

struct Found {
    abs: Utf8PathBuf,
    rel: String,
    kind: EntryKind,
}

pub struct Scanner;

impl Scanner {
    /// Enumerate everything below `root` without following symlinks.
    ///
    /// Paths are relative to `root` in wire form and the result is sorted, so parents
    /// precede their children. Sockets, devices and FIFOs are skipped.
    pub fn walk(root: &Utf8Path, opts: WalkOptions) -> Result<Vec<LocalEntry>, ScannerError> {
        debug!("Walking {} (hash: {})", root, opts.with_hash);

        let mut found = Vec::new();
        let mut it = WalkDir::new(root).follow_links(false).min_depth(1).into_iter();
        while let Some(entry) = it.next() {
            let entry = entry.map_err(std::io::Error::from)?;
            // No manifest path can name it, so it is neither synced nor swept.
            let Some(abs) = Utf8Path::from_path(entry.path()) else {
                warn!("Skipping non-UTF-8 path {}", entry.path().display());
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            };
            let rel = abs
                .strip_prefix(root)
                .map_err(|_| ScannerError::Path(abs.to_string()))?;
            let rel = LongshipPath::normalize(rel.as_str());
            if rel.is_empty() || rel.split('/').any(|seg| seg == "..") {
                return Err(ScannerError::Path(abs.to_string()));
            }

            let ft = entry.file_type();
            let kind = if ft.is_symlink() {
                EntryKind::Symlink
            } else if ft.is_dir() {
                EntryKind::Directory
            } else if ft.is_file() {
                EntryKind::File
            } else {
                debug!("Skipping special file {}", abs);
                continue;
            };

            found.push(Found {
                abs: abs.to_path_buf(),
                rel,
                kind,
            });
        }
        found.sort_by(|a, b| a.rel.cmp(&b.rel));

        if !opts.with_hash {
            return Ok(found
                .into_iter()
                .map(|f| LocalEntry {
                    relative_path: f.rel,
                    kind: f.kind,
                    content_hash: None,
                })
                .collect());
        }

        found
            .into_par_iter()
            .map(|f| -> Result<LocalEntry, ScannerError> {
                let content_hash = match f.kind {
                    EntryKind::Directory => None,
                    EntryKind::File => Some(compute_file_checksum(&f.abs)?),
                    EntryKind::Symlink => Some(Self::link_digest(&f.abs)?),
                };
                Ok(LocalEntry {
                    relative_path: f.rel,
                    kind: f.kind,
                    content_hash,
                })
            })
            .collect()
    }

    /// Digest of a symlink's target string, the same value the server publishes for it.
    pub fn link_digest(path: &Utf8Path) -> Result<String, ScannerError> {
        let target = fs::read_link(path)?;
        Ok(checksum_bytes(target.to_string_lossy().as_bytes()))
    }

    /// Walk and summarise `root`. Sizes come from `symlink_metadata`, so links count
    /// their own size rather than their target's.
    pub fn scan_directory(
        root: &Utf8Path,
        opts: WalkOptions,
    ) -> Result<(Vec<LocalEntry>, ScanStats), ScannerError> {
        let entries = Self::walk(root, opts)?;
        let mut stats = ScanStats::default();
        for e in &entries {
            match e.kind {
                EntryKind::File => {
                    stats.files += 1;
                    let abs = root.join(&e.relative_path);
                    stats.total_bytes += fs::symlink_metadata(abs).map(|m| m.len()).unwrap_or(0);
                }
                EntryKind::Directory => stats.directories += 1,
                EntryKind::Symlink => stats.symlinks += 1,
            }
        }
        info!(
            "Scanned {}: {} files, {} directories, {} symlinks",
            root, stats.files, stats.directories, stats.symlinks
        );
        Ok((entries, stats))
    }
}
