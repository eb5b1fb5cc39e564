use crate::path_utils::LongshipPath;
use crate::{EntryKind, ManifestEntry, RemoteManifest, ScanStatus};
use serde::{Deserialize, Serialize};

/// Body of `GET <server>/files` as sent on the wire.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileListExternal {
    pub status: u8,
    #[serde(default)]
    pub files: Option<Vec<FileEntryExternal>>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FileEntryExternal {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("malformed file list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("file list entry {path:?}: {source}")]
    Entry {
        path: String,
        #[source]
        source: crate::UnknownCode,
    },
    #[error(transparent)]
    Status(#[from] crate::UnknownCode),
}

impl TryFrom<FileListExternal> for RemoteManifest {
    type Error = FormatError;

    fn try_from(ext: FileListExternal) -> Result<Self, Self::Error> {
        let status = ScanStatus::try_from(ext.status)?;
        let mut entries = Vec::new();
        for f in ext.files.unwrap_or_default() {
            let kind = EntryKind::try_from(f.kind).map_err(|source| FormatError::Entry {
                path: f.path.clone(),
                source,
            })?;
            entries.push(ManifestEntry {
                // Normalize at the boundary so the reconciler, the sweep and the cache
                // all see one spelling of each path.
                relative_path: LongshipPath::normalize(&f.path),
                kind,
                content_hash: if kind == EntryKind::Directory {
                    String::new()
                } else {
                    f.hash.to_ascii_lowercase()
                },
            });
        }
        Ok(RemoteManifest { status, entries })
    }
}

pub fn parse_file_list(data: &[u8]) -> Result<RemoteManifest, FormatError> {
    let ext: FileListExternal = serde_json::from_slice(super::trim_json_prefix(data))?;
    ext.try_into()
}
