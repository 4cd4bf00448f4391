//! System toolchain — commands resolved from the ambient PATH
//!
//! The default when a project declares no toolchain. Nothing is installed;
//! executables are located with `which` and the "version" is a constant so
//! fingerprints stay stable across machines that share the same PATH setup.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Result, ToolchainError};
use crate::provider::{ResolvedToolchain, ToolchainProvider};

/// Provider backed by whatever is already on PATH
#[derive(Debug, Default)]
pub struct SystemToolchain;

pub const SYSTEM_VERSION: &str = "system";

#[async_trait]
impl ToolchainProvider for SystemToolchain {
    fn id(&self) -> &'static str {
        "system"
    }

    async fn resolve_version(&self, _requirement: Option<&str>) -> Result<String> {
        Ok(SYSTEM_VERSION.to_string())
    }

    async fn install(&self, _version: &str) -> Result<ResolvedToolchain> {
        Ok(ResolvedToolchain {
            tool: "system".to_string(),
            version: SYSTEM_VERSION.to_string(),
            bin_dirs: vec![],
            env: vec![],
        })
    }

    fn locate_executable(&self, _version: &str, bin: &str) -> Result<PathBuf> {
        which::which(bin).map_err(|_| ToolchainError::ExecutableNotFound {
            tool: "system".to_string(),
            bin: bin.to_string(),
        })
    }
}
