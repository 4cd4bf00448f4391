//! Toolchain provider trait and requirement parsing
//!
//! All providers implement [`ToolchainProvider`] to give the pipeline a
//! uniform interface for version resolution, installation, and process
//! environment setup, regardless of the underlying tool.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Result, ToolchainError};

/// A parsed toolchain requirement such as `node@20` or `system`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolchainSpec {
    /// Tool identifier (e.g. "node", "system")
    pub tool: String,
    /// Version requirement, when one was given
    pub requirement: Option<String>,
}

impl ToolchainSpec {
    /// Parse a `<tool>` or `<tool>@<requirement>` string
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ToolchainError::InvalidSpec(s.to_string()));
        }

        match s.split_once('@') {
            Some((tool, requirement)) => {
                if tool.is_empty() || requirement.is_empty() {
                    return Err(ToolchainError::InvalidSpec(s.to_string()));
                }
                Ok(Self {
                    tool: tool.to_string(),
                    requirement: Some(requirement.to_string()),
                })
            }
            None => Ok(Self {
                tool: s.to_string(),
                requirement: None,
            }),
        }
    }
}

impl std::fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.requirement {
            Some(requirement) => write!(f, "{}@{}", self.tool, requirement),
            None => f.write_str(&self.tool),
        }
    }
}

/// A toolchain resolved to a concrete version, ready for hashing and
/// environment setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToolchain {
    /// Tool identifier
    pub tool: String,
    /// Concrete version (e.g. "20.11.0")
    pub version: String,
    /// Directories to prepend to PATH for task processes
    pub bin_dirs: Vec<PathBuf>,
    /// Extra environment variables for task processes
    pub env: Vec<(String, String)>,
}

impl ResolvedToolchain {
    /// Identifier used in hash manifests, e.g. "node@20.11.0"
    pub fn hash_id(&self) -> String {
        format!("{}@{}", self.tool, self.version)
    }
}

/// Provider trait implemented per tool ecosystem
#[async_trait]
pub trait ToolchainProvider: Send + Sync {
    /// Unique identifier for this provider (e.g. "node", "system")
    fn id(&self) -> &'static str;

    /// Resolve a version requirement to a concrete installed or
    /// installable version
    async fn resolve_version(&self, requirement: Option<&str>) -> Result<String>;

    /// Ensure the resolved version is installed. Idempotent; returns
    /// quickly when the version is already present.
    async fn install(&self, version: &str) -> Result<ResolvedToolchain>;

    /// Locate an executable within the installed toolchain
    fn locate_executable(&self, version: &str, bin: &str) -> Result<PathBuf>;
}
