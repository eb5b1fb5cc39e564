use camino::Utf8Path;
use md5::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};

const READ_BUF_LEN: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("IO error hashing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not a regular file")]
    NotAFile(String),
}

/// Incremental MD5 digest. Fed chunk by chunk while a download is written so the
/// digest of the written bytes is known without reading the file back.
pub struct StreamingChecksum {
    ctx: Context,
    len: u64,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self {
            ctx: Context::new(),
            len: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.ctx.consume(chunk);
        self.len += chunk.len() as u64;
    }

    /// Bytes consumed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lowercase hex digest.
    pub fn finish(self) -> String {
        format!("{:x}", self.ctx.finalize())
    }
}

impl Default for StreamingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream `reader` through MD5 and return the lowercase hex digest.
pub fn checksum_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = StreamingChecksum::new();
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

pub fn checksum_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Digest of a regular file's contents. Symlinks are followed by `File::open`; callers
/// that must not follow links check the entry kind first.
pub fn compute_file_checksum(path: &Utf8Path) -> Result<String, HashError> {
    let io_err = |source| HashError::Io {
        path: path.to_string(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let meta = file.metadata().map_err(io_err)?;
    if !meta.is_file() {
        return Err(HashError::NotAFile(path.to_string()));
    }
    checksum_reader(BufReader::new(file)).map_err(io_err)
}
