//! Cache errors
//!
//! Cache errors are never fatal to a run: the store surfaces them to the
//! pipeline as misses and logs the underlying cause.

use thiserror::Error;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors while reading or writing cache entries
#[derive(Debug, Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive creation or extraction failed
    #[error("Cache archive error: {0}")]
    Archive(String),

    /// Remote cache request failed
    #[error("Remote cache error: {0}")]
    Remote(String),
}
