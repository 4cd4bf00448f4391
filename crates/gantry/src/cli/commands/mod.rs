//! CLI command implementations

mod cache;
mod ci;
mod graph;
mod hash;
mod init;
mod run;

pub use cache::CacheCommand;
pub use ci::CiCommand;
pub use graph::GraphCommand;
pub use hash::HashCommand;
pub use init::InitCommand;
pub use run::RunCommand;

use std::path::PathBuf;

use anyhow::Context;
use gantry_core::config::{load_config_or_default, WorkspaceConfig};
use gantry_core::WorkspaceGraph;

/// Locate the workspace and build its graph. The workspace root is the
/// directory holding the config file, falling back to the current
/// directory when none is found.
pub(crate) fn load_workspace() -> anyhow::Result<(WorkspaceConfig, PathBuf, WorkspaceGraph)> {
    let cwd = std::env::current_dir()?;
    let (config, found_root) = load_config_or_default(&cwd);
    let root = found_root.unwrap_or(cwd);

    let graph = WorkspaceGraph::load(&root, &config)
        .with_context(|| format!("Failed to load workspace at {}", root.display()))?;

    Ok((config, root, graph))
}
