//! Error types for Gantry

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GantryError
pub type Result<T> = std::result::Result<T, GantryError>;

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Graph-related errors
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Target-related errors
    #[error(transparent)]
    Target(#[from] TargetError),

    /// Version control errors
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// A declared project references a source path that does not exist
    #[error("Project '{id}' source path does not exist: {path}")]
    MissingProjectSource { id: String, path: PathBuf },

    /// Referenced project does not exist
    #[error("Unknown project '{0}' referenced in configuration")]
    UnknownProject(String),

    /// Referenced task does not exist
    #[error("Unknown task '{task}' referenced from project '{project}'")]
    UnknownTask { project: String, task: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Structural problems in the project or action graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// A cycle was found; the message contains the full cycle path
    #[error("Cycle detected in dependency graph: {0}")]
    Cycle(String),

    /// A dependency edge points at a node that is not in the graph
    #[error("Dangling dependency edge: '{from}' depends on unknown node '{to}'")]
    DanglingEdge { from: String, to: String },
}

/// Target addressing errors
#[derive(Debug, Error)]
pub enum TargetError {
    /// Target string could not be parsed
    #[error("Invalid target '{0}', expected '<project>:<task>' format")]
    InvalidFormat(String),

    /// Glob pattern in a target expression is invalid
    #[error("Invalid glob in target expression '{pattern}': {message}")]
    InvalidGlob { pattern: String, message: String },
}

/// Version control errors (touched-file detection)
#[derive(Debug, Error)]
pub enum VcsError {
    /// Failed to run the underlying git command
    #[error("Failed to run git: {0}")]
    CommandFailed(String),
}
