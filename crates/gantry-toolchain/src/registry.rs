//! Provider registry
//!
//! Holds one provider per tool id and resolves toolchain requirement
//! strings to installed, environment-ready toolchains.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ToolchainError};
use crate::provider::{ResolvedToolchain, ToolchainProvider, ToolchainSpec};
use crate::providers::{NodeToolchain, SystemToolchain};

/// Directory under the user home for managed tool installs
pub fn default_tools_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gantry")
        .join("tools")
}

/// Registry of toolchain providers keyed by tool id
pub struct ToolchainRegistry {
    providers: BTreeMap<String, Arc<dyn ToolchainProvider>>,
}

impl ToolchainRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            providers: BTreeMap::new(),
        }
    }

    /// Registry with all built-in providers, tools installed under the
    /// given directory
    pub fn with_builtin(tools_dir: PathBuf) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SystemToolchain));
        registry.register(Arc::new(NodeToolchain::new(tools_dir)));
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: Arc<dyn ToolchainProvider>) {
        debug!(id = provider.id(), "registered toolchain provider");
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Look up a provider by tool id
    pub fn get(&self, tool: &str) -> Result<&Arc<dyn ToolchainProvider>> {
        self.providers
            .get(tool)
            .ok_or_else(|| ToolchainError::UnknownTool(tool.to_string()))
    }

    /// Registered tool ids
    pub fn tool_ids(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }

    /// Resolve and install the toolchain for a requirement string
    /// such as "node@20"
    pub async fn setup(&self, spec_str: &str) -> Result<ResolvedToolchain> {
        let spec = ToolchainSpec::parse(spec_str)?;
        let provider = self.get(&spec.tool)?;

        let version = provider.resolve_version(spec.requirement.as_deref()).await?;
        debug!(tool = %spec.tool, %version, "resolved toolchain version");

        provider.install(&version).await
    }
}

impl Default for ToolchainRegistry {
    fn default() -> Self {
        Self::with_builtin(default_tools_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_providers_registered() {
        let temp = TempDir::new().unwrap();
        let registry = ToolchainRegistry::with_builtin(temp.path().to_path_buf());
        assert_eq!(registry.tool_ids(), vec!["node", "system"]);
    }

    #[test]
    fn test_unknown_tool() {
        let registry = ToolchainRegistry::new();
        assert!(matches!(
            registry.get("deno"),
            Err(ToolchainError::UnknownTool(_))
        ));
    }

    #[tokio::test]
    async fn test_setup_system_toolchain() {
        let temp = TempDir::new().unwrap();
        let registry = ToolchainRegistry::with_builtin(temp.path().to_path_buf());

        let resolved = registry.setup("system").await.unwrap();
        assert_eq!(resolved.hash_id(), "system@system");
    }

    #[tokio::test]
    async fn test_setup_rejects_malformed_spec() {
        let registry = ToolchainRegistry::new();
        assert!(matches!(
            registry.setup("@20").await,
            Err(ToolchainError::InvalidSpec(_))
        ));
    }
}
