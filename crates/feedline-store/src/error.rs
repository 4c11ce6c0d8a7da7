use thiserror::Error;

/// Errors that can occur during event log operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The payload could not be encoded for storage.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking query task panicked or was cancelled.
    #[error("query task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<StoreError> for feedline_core::FeedlineError {
    fn from(e: StoreError) -> Self {
        feedline_core::FeedlineError::Source(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
