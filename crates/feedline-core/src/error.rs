use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedlineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed event {id}: {reason}")]
    MalformedEvent { id: i64, reason: String },

    #[error("Event log unavailable: {0}")]
    Source(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FeedlineError {
    /// Short error code string, stable across releases; used in log fields.
    pub fn code(&self) -> &'static str {
        match self {
            FeedlineError::Config(_) => "CONFIG_ERROR",
            FeedlineError::MalformedEvent { .. } => "MALFORMED_EVENT",
            FeedlineError::Source(_) => "SOURCE_ERROR",
            FeedlineError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedlineError>;
