//! Error types for Orderline Core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Payload errors
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Order payload has no order_uid")]
    MissingKey,

    // Store errors
    #[error("Order already exists: {0}")]
    DuplicateKey(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Database error: {0}")]
    Database(String),

    // Message source errors
    #[error("Message source error: {0}")]
    Source(String),

    #[error("Message source closed")]
    SourceClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::StoreWriteFailed(_)
                | Error::Database(_)
                | Error::Source(_)
                | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
