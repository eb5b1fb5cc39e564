use serde::{Deserialize, Serialize};
use std::fmt;

pub mod endpoint;
pub mod formats;
pub mod path_utils;
pub mod plan;

pub use endpoint::{Mirror, MirrorStyle, ServerEndpoint};
pub use plan::{plan, PlanAction, SyncPlan};

/// Lowercase hex MD5, as published by the sync server.
pub type Md5Digest = String;

/// Kind of a manifest or local entry. Wire values match the server's `type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

impl EntryKind {
    pub fn code(self) -> u8 {
        match self {
            EntryKind::File => 1,
            EntryKind::Directory => 2,
            EntryKind::Symlink => 3,
        }
    }
}

impl TryFrom<u8> for EntryKind {
    type Error = UnknownCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(EntryKind::File),
            2 => Ok(EntryKind::Directory),
            3 => Ok(EntryKind::Symlink),
            other => Err(UnknownCode {
                field: "type",
                value: other,
            }),
        }
    }
}

impl From<EntryKind> for u8 {
    fn from(kind: EntryKind) -> u8 {
        kind.code()
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => f.write_str("file"),
            EntryKind::Directory => f.write_str("directory"),
            EntryKind::Symlink => f.write_str("symlink"),
        }
    }
}

/// Server-side readiness of the manifest. Only `Completed` manifests are acted upon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum ScanStatus {
    Waiting,
    Scanning,
    Failed,
    Completed,
}

impl TryFrom<u8> for ScanStatus {
    type Error = UnknownCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ScanStatus::Waiting),
            20 => Ok(ScanStatus::Scanning),
            30 => Ok(ScanStatus::Failed),
            40 => Ok(ScanStatus::Completed),
            other => Err(UnknownCode {
                field: "status",
                value: other,
            }),
        }
    }
}

impl From<ScanStatus> for u8 {
    fn from(status: ScanStatus) -> u8 {
        match status {
            ScanStatus::Waiting => 10,
            ScanStatus::Scanning => 20,
            ScanStatus::Failed => 30,
            ScanStatus::Completed => 40,
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanStatus::Waiting => f.write_str("waiting"),
            ScanStatus::Scanning => f.write_str("scanning"),
            ScanStatus::Failed => f.write_str("failed"),
            ScanStatus::Completed => f.write_str("completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} code {value}")]
pub struct UnknownCode {
    pub field: &'static str,
    pub value: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Forward-slash path relative to the sync root, without leading or trailing separators.
    pub relative_path: String,
    pub kind: EntryKind,
    /// Empty for directories.
    pub content_hash: Md5Digest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteManifest {
    pub status: ScanStatus,
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalEntry {
    pub relative_path: String,
    pub kind: EntryKind,
    /// Only populated when the walk was asked to hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Md5Digest>,
}

/// Subtrees the deletion sweep may remove unlisted content from.
pub const DEFAULT_DELETABLE_PREFIXES: &[&str] = &["BepInEx", "doorstop_libs", "unstripped_corlib"];
