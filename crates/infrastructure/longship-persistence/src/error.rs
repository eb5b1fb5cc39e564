use longship_infra::HashError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("digest mismatch: expected {expected}, stored bytes hash to {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    Io,
    Codec,
    InvalidPath,
    Integrity,
}

impl StorageError {
    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::Io(_) | StorageError::Hash(_) => StorageErrorKind::Io,
            StorageError::Serde(_) => StorageErrorKind::Codec,
            StorageError::InvalidPath(_) => StorageErrorKind::InvalidPath,
            StorageError::DigestMismatch { .. } => StorageErrorKind::Integrity,
        }
    }
}
