//! Pipeline errors

use thiserror::Error;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single action's execution failure. Recorded on the action rather than
/// failing the whole run, unless the action aborts.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Task has no command to run
    #[error("Task '{0}' has no command")]
    MissingCommand(String),

    /// Process could not be spawned
    #[error("Failed to spawn '{command}': {message}")]
    Spawn { command: String, message: String },

    /// Process exited unsuccessfully
    #[error("Command '{command}' exited with {code}")]
    NonZeroExit { command: String, code: i32 },

    /// Process was killed by a signal or exited without a code
    #[error("Command '{command}' was terminated")]
    Terminated { command: String },

    /// Action exceeded its timeout
    #[error("Action timed out after {0} seconds")]
    Timeout(u64),

    /// Run was cancelled while the action was in flight
    #[error("Action was cancelled")]
    Cancelled,
}

/// Top-level pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] gantry_core::GantryError),

    #[error(transparent)]
    Hash(#[from] gantry_hash::HashError),

    #[error(transparent)]
    Cache(#[from] gantry_cache::CacheError),

    #[error(transparent)]
    Toolchain(#[from] gantry_toolchain::ToolchainError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A worker task panicked or was aborted
    #[error("Pipeline worker failed: {0}")]
    Worker(String),

    /// IO error
    #[error("Pipeline IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Pipeline serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
