use std::sync::Arc;

use camino::Utf8PathBuf;
use longship_core::{Mirror, ScanStatus, ServerEndpoint, DEFAULT_DELETABLE_PREFIXES};
use longship_infra::{NetError, ServerUrls};
use longship_persistence::BlobCache;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

pub mod engine;
pub mod execute;
pub mod remote;
pub mod retry;

use remote::HttpRemoteSource;
use retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Top-level subtrees the deletion sweep may remove unlisted content from.
    pub deletable_prefixes: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            deletable_prefixes: DEFAULT_DELETABLE_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub local_root: Utf8PathBuf,
    pub options: SyncOptions,
}

impl SyncRequest {
    pub fn new(local_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            options: SyncOptions::default(),
        }
    }
}

/// Where a cycle is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    FetchingManifest,
    Retrying,
    Syncing,
    Sweeping,
    Done,
    Aborted,
}

/// Wake-ups sent while a cycle runs. Delivery is best effort; the shared
/// [`crate::SyncProgress`] stays the source of truth for counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Phase(SyncPhase),
    EntrySynced {
        relative_path: String,
        current: usize,
        total: usize,
    },
    Retrying {
        attempt: u32,
        max_attempts: u32,
    },
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub skipped: usize,
    pub created: usize,
    pub updated: usize,
    pub cache_hits: usize,
    pub network_fetches: usize,
    pub deleted: usize,
    pub cache_write_failures: usize,
}

impl SyncReport {
    pub fn changed(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// High-level error type for sync operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Unsafe path: {0}")]
    Path(String),
    #[error("Integrity error for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("Cache write failed: {0}")]
    CacheWrite(String),
    #[error("Server still scanning after {attempts} attempts")]
    ServerBusy { attempts: u32 },
    #[error("Manifest unavailable (server status: {0})")]
    ManifestUnavailable(ScanStatus),
    #[error("Local state error: {0}")]
    Local(String),
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// The reason shown next to "update failed".
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Network(_) => "Could not reach the update server.".into(),
            SyncError::Protocol(_) => "The update server sent an unexpected response.".into(),
            SyncError::Path(p) => format!("The server listed an unsafe path: {p}"),
            SyncError::Integrity { path, .. } => {
                format!("Downloaded file {path} was corrupted. Please try again.")
            }
            SyncError::CacheWrite(_) => "Could not write to the local cache.".into(),
            SyncError::ServerBusy { .. } => {
                "The server is rebuilding its file list. Please try again in a minute.".into()
            }
            SyncError::ManifestUnavailable(ScanStatus::Failed) => {
                "The server failed to build its file list.".into()
            }
            SyncError::ManifestUnavailable(_) => "The server's file list is not ready yet.".into(),
            SyncError::Local(_) => "Could not write to the game directory.".into(),
            SyncError::Cancelled => "Update cancelled.".into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<NetError> for SyncError {
    fn from(e: NetError) -> Self {
        SyncError::Network(e.to_string())
    }
}

impl From<longship_scanner::ScannerError> for SyncError {
    fn from(e: longship_scanner::ScannerError) -> Self {
        match e {
            longship_scanner::ScannerError::Path(p) => SyncError::Path(p),
            other => SyncError::Local(other.to_string()),
        }
    }
}

/// Non-blocking publish. A full or closed channel is ignored.
pub(crate) fn emit(events: Option<&Sender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        let _ = tx.try_send(event);
    }
}

pub use engine::DefaultSyncEngine;

/// Convenience constructor for the HTTP-backed engine.
pub fn default_engine(
    client: reqwest::Client,
    server: &ServerEndpoint,
    mirrors: Vec<Mirror>,
    cache: Option<Arc<dyn BlobCache>>,
) -> Result<DefaultSyncEngine, SyncError> {
    let urls = ServerUrls::new(server)?;
    let remote = HttpRemoteSource::new(client, urls, mirrors);
    Ok(DefaultSyncEngine::new(Arc::new(remote), cache))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_distinguish_terminal_states() {
        assert_ne!(
            SyncError::ManifestUnavailable(ScanStatus::Failed).user_message(),
            SyncError::ManifestUnavailable(ScanStatus::Waiting).user_message()
        );
        assert!(SyncError::Cancelled.is_cancelled());
        assert!(SyncError::Integrity {
            path: "a.txt".into(),
            expected: "x".into(),
            actual: "y".into()
        }
        .user_message()
        .contains("a.txt"));
    }

    #[test]
    fn default_options_use_standard_prefixes() {
        let opts = SyncOptions::default();
        assert_eq!(
            opts.deletable_prefixes,
            vec!["BepInEx", "doorstop_libs", "unstripped_corlib"]
        );
        assert_eq!(opts.retry.max_attempts, 3);
    }
}
