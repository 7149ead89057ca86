use thiserror::Error;

/// Errors surfaced by the throttler.
///
/// Lock contention during a drain is not an error and never shows up here;
/// malformed job flags are ignored rather than reported.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid bucket spec for '{bucket_type}': {reason}")]
    InvalidSpec { bucket_type: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn invalid_spec(bucket_type: &str, reason: impl Into<String>) -> Self {
        Error::InvalidSpec {
            bucket_type: bucket_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Configuration(format!("Failed to parse bucket configuration: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
