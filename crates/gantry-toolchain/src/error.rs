//! Toolchain errors

use thiserror::Error;

/// Result type alias using ToolchainError
pub type Result<T> = std::result::Result<T, ToolchainError>;

/// Errors while resolving or installing toolchains
#[derive(Debug, Error)]
pub enum ToolchainError {
    /// Malformed toolchain requirement string
    #[error("Invalid toolchain spec '{0}', expected '<tool>' or '<tool>@<requirement>'")]
    InvalidSpec(String),

    /// No provider registered for the tool
    #[error("No toolchain provider registered for '{0}'")]
    UnknownTool(String),

    /// The requirement matched no published version
    #[error("No version of '{tool}' satisfies requirement '{requirement}'")]
    UnresolvedVersion { tool: String, requirement: String },

    /// Requirement is not valid semver
    #[error("Invalid version requirement '{requirement}' for '{tool}': {message}")]
    InvalidRequirement {
        tool: String,
        requirement: String,
        message: String,
    },

    /// The tool binary could not be located
    #[error("Executable '{bin}' for '{tool}' not found")]
    ExecutableNotFound { tool: String, bin: String },

    /// Download or version index fetch failed
    #[error("Toolchain download failed: {0}")]
    Download(String),

    /// Archive extraction failed
    #[error("Toolchain archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("Toolchain IO error: {0}")]
    Io(#[from] std::io::Error),
}
