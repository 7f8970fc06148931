//! Storage error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Whether this error means "there was nothing usable on disk"
    ///
    /// A missing file and an unreadable one are both handled as a cold start.
    pub fn is_absent(&self) -> bool {
        matches!(self, StorageError::NotFound(_) | StorageError::InvalidData(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
