use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use camino::Utf8Path;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::api::CacheRecord;
use crate::StorageError;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// On-disk shape of the cache index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default)]
    pub generate_timestamp: i64,
    #[serde(default)]
    pub generate_time: String,
    #[serde(default)]
    pub update_timestamp: i64,
    #[serde(default)]
    pub update_time: String,
    #[serde(default)]
    pub files: BTreeMap<String, CacheRecord>,
}

fn stamp(now: i64) -> String {
    Local
        .timestamp_opt(now, 0)
        .single()
        .map(|t| t.format(TIME_FORMAT).to_string())
        .unwrap_or_default()
}

impl IndexDocument {
    pub fn fresh(now: i64) -> Self {
        let mut doc = Self::default();
        doc.mark_generated(now);
        doc
    }

    pub fn mark_generated(&mut self, now: i64) {
        self.generate_timestamp = now;
        self.generate_time = stamp(now);
        self.mark_updated(now);
    }

    pub fn mark_updated(&mut self, now: i64) {
        self.update_timestamp = now;
        self.update_time = stamp(now);
    }
}

pub fn decode_index(bytes: &[u8]) -> Result<IndexDocument, StorageError> {
    Ok(serde_json::from_slice(bytes)?)
}

pub fn encode_index(doc: &IndexDocument) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec_pretty(doc)?)
}

/// Write `doc` to `<path>.tmp`, sync it, then rename over `path`. A crash leaves either
/// the old or the new index, never a torn one.
pub fn write_index_atomic(path: &Utf8Path, doc: &IndexDocument) -> Result<(), StorageError> {
    let bytes = encode_index(doc)?;
    let tmp_path = path.with_file_name(format!(
        "{}.tmp",
        path.file_name().unwrap_or(crate::INDEX_FILENAME)
    ));

    let mut file = fs::File::create(&tmp_path)?;
    let written = file.write_all(&bytes).and_then(|_| file.sync_all());
    drop(file);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use longship_core::EntryKind;

    #[test]
    fn index_uses_server_style_field_names() {
        let mut doc = IndexDocument::fresh(1_700_000_000);
        doc.files.insert(
            "abc".into(),
            CacheRecord {
                content_hash: "abc".into(),
                relative_path: "2024-01-01/lscache-1-0".into(),
                kind: EntryKind::File,
                last_seen: 1_700_000_000,
            },
        );
        let json: serde_json::Value = serde_json::from_slice(&encode_index(&doc).unwrap()).unwrap();
        assert_eq!(json["generate_timestamp"], 1_700_000_000);
        assert_eq!(json["files"]["abc"]["type"], 1);
        assert_eq!(json["files"]["abc"]["hash"], "abc");
        assert_eq!(json["files"]["abc"]["relative_path"], "2024-01-01/lscache-1-0");
    }

    #[test]
    fn older_index_without_last_seen_still_loads() {
        let raw = br#"{"generate_timestamp": 1, "files": {"d": {"relative_path": "x/y", "type": 1, "hash": "d"}}}"#;
        let doc = decode_index(raw).unwrap();
        assert_eq!(doc.files["d"].last_seen, 0);
        assert!(doc.update_time.is_empty());
    }
}
