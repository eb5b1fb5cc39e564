use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

static QUARANTINE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Name a quarantined copy of `file_name`: `<name>.corrupt.<ts>.<pid>.<n>`.
fn quarantine_name(file_name: &str) -> String {
    let ts = Utc::now().format("%Y%m%dT%H%M%S%.f");
    let pid = std::process::id();
    let n = QUARANTINE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{file_name}.corrupt.{ts}.{pid}.{n}")
}

/// Move an unreadable index aside so a fresh one can take its place. Returns where it
/// went, or `None` if there was nothing to move.
pub fn quarantine_corrupt_file(path: &Utf8Path) -> std::io::Result<Option<Utf8PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let new_path = path.with_file_name(quarantine_name(
        path.file_name().unwrap_or(crate::INDEX_FILENAME),
    ));
    std::fs::rename(path, &new_path)?;
    Ok(Some(new_path))
}

/// True for names this crate writes next to blobs that are not blobs themselves.
pub fn is_bookkeeping_file(name: &str) -> bool {
    name.starts_with(crate::INDEX_FILENAME) || name.ends_with(".part") || name.ends_with(".tmp")
}
