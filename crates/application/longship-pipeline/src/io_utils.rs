use longship_infra::StreamingChecksum;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;

/// Rename with exponential backoff. Windows scanners and indexers briefly hold fresh
/// files open, which makes the first rename fail with a sharing violation.
pub async fn robust_rename<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> io::Result<()> {
    let mut attempt = 0u32;
    let max_attempts = 8u32;
    let mut backoff = Duration::from_millis(50);

    loop {
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(e);
                }
                tokio::time::sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, Duration::from_millis(2000));
            }
        }
    }
}

/// Remove whatever is at `path` without following symlinks. Missing entries are fine.
pub async fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let res = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Blocking copy that hashes the bytes as they pass. Returns the lowercase hex digest of
/// what was written.
pub fn copy_hashing(src: &Path, dest: &Path) -> io::Result<String> {
    let mut input = fs::File::open(src)?;
    let mut out = io::BufWriter::new(fs::File::create(dest)?);
    let mut hasher = StreamingChecksum::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = match input.read(&mut buf) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_entry_handles_files_dirs_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let sub = dir.path().join("d");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir_all(sub.join("inner")).unwrap();
        std::fs::write(sub.join("inner/g"), b"y").unwrap();

        remove_entry(&file).await.unwrap();
        remove_entry(&sub).await.unwrap();
        remove_entry(&dir.path().join("missing")).await.unwrap();
        assert!(!file.exists());
        assert!(!sub.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn remove_entry_does_not_follow_links() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("keep"), b"k").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        remove_entry(&link).await.unwrap();
        assert!(!link.exists());
        assert!(target.join("keep").exists());
    }

    #[test]
    fn copy_hashing_reports_digest_of_copied_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        std::fs::write(&src, b"hello world").unwrap();
        let digest = copy_hashing(&src, &dest).unwrap();
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }
}
