//! Error types for postsync operations.

use thiserror::Error;

/// Result type alias for postsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for postsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The requested topic does not exist.
    #[error("Topic not found: {0}")]
    NotFound(String),

    /// The current user may not view the requested topic.
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Transport-level failure; the operation may be retried.
    #[error("Network error: {0}")]
    Network(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Creates a new not-found error.
    pub fn not_found<T: ToString>(msg: T) -> Self {
        Self::NotFound(msg.to_string())
    }

    /// Creates a new forbidden error.
    pub fn forbidden<T: ToString>(msg: T) -> Self {
        Self::Forbidden(msg.to_string())
    }

    /// Creates a new network error.
    pub fn network<T: ToString>(msg: T) -> Self {
        Self::Network(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}

/// Classification of a failed full topic load.
///
/// A failed refresh maps to exactly one of these; stream state is never
/// mutated on failure, so the classification is the only observable outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicLoadError {
    /// The topic does not exist (HTTP 404 or 410).
    NotFound,
    /// The user may not view the topic (HTTP 403).
    Forbidden,
    /// Any other failure, including transport errors.
    Generic,
}

impl TopicLoadError {
    /// Classifies an HTTP-style status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => TopicLoadError::NotFound,
            403 => TopicLoadError::Forbidden,
            _ => TopicLoadError::Generic,
        }
    }
}

impl From<TopicLoadError> for SyncError {
    fn from(err: TopicLoadError) -> Self {
        match err {
            TopicLoadError::NotFound => SyncError::not_found("topic"),
            TopicLoadError::Forbidden => SyncError::forbidden("topic"),
            TopicLoadError::Generic => SyncError::network("topic load failed"),
        }
    }
}
