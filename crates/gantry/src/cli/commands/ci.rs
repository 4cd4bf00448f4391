//! CI command — affected-only runs with CI policies

use clap::Args;
use console::style;

use super::run::{execute_targets, select_targets, PipelineOverrides};
use crate::cli::Cli;

/// Run affected targets with CI policies applied
#[derive(Debug, Args)]
pub struct CiCommand {
    /// Targets to consider (defaults to every task in the workspace)
    pub targets: Vec<String>,

    /// Base ref for affected detection
    #[arg(long)]
    pub base: Option<String>,

    /// Head ref for affected detection
    #[arg(long, default_value = "HEAD")]
    pub head: String,

    /// Maximum concurrently running actions
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Disable the cache for this run
    #[arg(long)]
    pub no_cache: bool,
}

impl CiCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, root, graph) = super::load_workspace()?;

        // No explicit targets means every task in the workspace is a
        // candidate, then affected filtering narrows the set.
        let exprs: Vec<String> = if self.targets.is_empty() {
            graph.all_targets().iter().map(|t| t.to_string()).collect()
        } else {
            self.targets.clone()
        };

        if exprs.is_empty() {
            if !cli.quiet {
                println!("{} Workspace has no tasks.", style("✓").green());
            }
            return Ok(());
        }

        let targets = select_targets(
            &graph,
            &config,
            &root,
            &exprs,
            true,
            self.base.as_deref(),
            &self.head,
            true,
        )?;

        if targets.is_empty() {
            if !cli.quiet {
                println!("{} No affected targets.", style("✓").green());
            }
            return Ok(());
        }

        let overrides = PipelineOverrides {
            concurrency: self.concurrency,
            no_cache: self.no_cache,
            ..Default::default()
        };

        execute_targets(cli, &config, &root, graph, &targets, overrides).await
    }
}
