//! Hashing errors

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using HashError
pub type Result<T> = std::result::Result<T, HashError>;

/// Errors while computing or inspecting fingerprints
#[derive(Debug, Error)]
pub enum HashError {
    /// A declared input file is missing and the task does not tolerate
    /// optional inputs
    #[error("Task '{target}' declares input '{path}' which does not exist")]
    MissingInput { target: String, path: PathBuf },

    /// An input pattern is not a valid glob
    #[error("Invalid input pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// No manifest matches the queried hash or prefix
    #[error("No hash manifest found matching '{0}'")]
    UnknownHash(String),

    /// A short prefix matches more than one manifest
    #[error("Hash prefix '{prefix}' is ambiguous, matches: {}", matches.join(", "))]
    AmbiguousPrefix { prefix: String, matches: Vec<String> },

    /// IO error
    #[error("Hash IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Hash manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
