//! Run command — execute task targets

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use console::style;

use gantry_cache::CacheStore;
use gantry_core::config::WorkspaceConfig;
use gantry_core::workspace::expand_targets;
use gantry_core::{AffectedResolver, Target, TargetExpr, WorkspaceGraph};
use gantry_pipeline::{
    ActionEvent, ActionGraph, ActionStatus, Pipeline, PipelineOptions, Reporter, RunReport,
    TracingReporter,
};
use gantry_toolchain::ToolchainRegistry;

use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Run task targets
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Targets to run (e.g. app:build ':test' '!docs:lint')
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Only run targets affected by changed files
    #[arg(long)]
    pub affected: bool,

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

    /// Resolve and report without executing task commands
    #[arg(long)]
    pub dry_run: bool,

    /// Cancel the rest of the run on the first failure
    #[arg(long)]
    pub bail: bool,

    /// Default extra attempts for failing tasks
    #[arg(long)]
    pub retry_count: Option<u8>,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, root, graph) = super::load_workspace()?;

        let targets = select_targets(
            &graph,
            &config,
            &root,
            &self.targets,
            self.affected,
            self.base.as_deref(),
            &self.head,
            false,
        )?;

        if targets.is_empty() {
            if !cli.quiet {
                println!("{} No matching targets to run.", style("✓").green());
            }
            return Ok(());
        }

        let overrides = PipelineOverrides {
            concurrency: self.concurrency,
            no_cache: self.no_cache,
            dry_run: self.dry_run,
            bail: self.bail,
            retry_count: self.retry_count,
        };

        execute_targets(cli, &config, &root, graph, &targets, overrides).await
    }
}

/// CLI-level overrides on top of workspace runner configuration
#[derive(Debug, Default)]
pub(crate) struct PipelineOverrides {
    pub concurrency: Option<usize>,
    pub no_cache: bool,
    pub dry_run: bool,
    pub bail: bool,
    pub retry_count: Option<u8>,
}

/// Expand target expressions and apply affected filtering
#[allow(clippy::too_many_arguments)]
pub(crate) fn select_targets(
    graph: &WorkspaceGraph,
    config: &WorkspaceConfig,
    root: &Path,
    exprs: &[String],
    affected: bool,
    base: Option<&str>,
    head: &str,
    ci_mode: bool,
) -> anyhow::Result<Vec<Target>> {
    let parsed: Vec<TargetExpr> = exprs
        .iter()
        .map(|s| TargetExpr::parse(s))
        .collect::<Result<_, _>>()
        .context("Invalid target expression")?;

    let all = graph.all_targets();
    let expanded = expand_targets(&parsed, &all)?;

    let touched: HashSet<PathBuf> = if affected {
        let base = base.unwrap_or(&config.affected.default_base);
        gantry_core::workspace::touched_files_from_git(root, Some(base), head)
            .context("Failed to determine changed files from git")?
    } else {
        HashSet::new()
    };

    let resolver = AffectedResolver::new(graph, &touched)
        .with_ci_mode(ci_mode)
        .with_affected_on_no_inputs(config.affected.on_no_inputs);

    let set = if affected {
        resolver.resolve(&expanded)?
    } else {
        resolver.resolve_all(&expanded)?
    };

    Ok(set.targets().cloned().collect())
}

/// Build the pipeline for the selected targets, execute it, and render
/// the outcome. Exits non-zero when any action fails.
pub(crate) async fn execute_targets(
    cli: &Cli,
    config: &WorkspaceConfig,
    root: &Path,
    graph: WorkspaceGraph,
    targets: &[Target],
    overrides: PipelineOverrides,
) -> anyhow::Result<()> {
    let workspace = Arc::new(graph);
    let action_graph = ActionGraph::build(&workspace, targets)?;

    if !cli.quiet && cli.format == OutputFormat::Text {
        println!(
            "{} {} action{} for {} target{}",
            style("→").blue(),
            action_graph.len(),
            if action_graph.len() == 1 { "" } else { "s" },
            targets.len(),
            if targets.len() == 1 { "" } else { "s" },
        );
        println!();
    }

    let mut cache_config = config.cache.clone();
    if overrides.no_cache {
        cache_config.enabled = false;
    }
    let store = Arc::new(CacheStore::new(root, &cache_config)?);
    let toolchains = Arc::new(ToolchainRegistry::default());

    let mut options = PipelineOptions::from_config(&config.runner);
    if let Some(concurrency) = overrides.concurrency {
        options.concurrency = concurrency;
    }
    if let Some(retry_count) = overrides.retry_count {
        options.retry_count = retry_count;
    }
    options.bail = options.bail || overrides.bail;
    options.dry_run = overrides.dry_run;

    let reporter: Arc<dyn Reporter> = if cli.quiet || cli.format == OutputFormat::Json {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ConsoleReporter::new(cli.verbose))
    };

    let pipeline = Pipeline::new(workspace, action_graph, store, toolchains, options)
        .with_reporter(reporter);

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = pipeline.run().await?;

    render_report(cli, &report)?;

    if !report.is_success() {
        std::process::exit(exit_codes::ACTION_FAILED);
    }
    Ok(())
}

fn render_report(cli: &Cli, report: &RunReport) -> anyhow::Result<()> {
    if cli.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if cli.quiet {
        return Ok(());
    }

    let summary = &report.summary;
    println!();
    println!(
        "  {} {}/{} passed, {} cached, {} skipped, {} failed, {} invalid ({:.1}s)",
        if summary.is_success() {
            style("✓").green().bold()
        } else {
            style("✗").red().bold()
        },
        summary.passed,
        summary.total,
        summary.cached,
        summary.skipped,
        summary.failed,
        summary.invalid,
        report.duration_ms as f64 / 1000.0,
    );

    for action in report.flaky_actions() {
        println!(
            "  {} {} {}",
            style("!").yellow(),
            action.label,
            style("(flaky: passed after retry)").dim()
        );
    }
    for action in report.slow_actions() {
        println!(
            "  {} {} {}",
            style("!").yellow(),
            action.label,
            style("(slow)").dim()
        );
    }

    if !summary.is_success() {
        println!();
        for action in &report.actions {
            if matches!(
                action.status,
                ActionStatus::Failed | ActionStatus::FailedAndAbort
            ) {
                println!(
                    "    {} {}: {}",
                    style("✗").red(),
                    action.label,
                    action.error.as_deref().unwrap_or("failed")
                );
            }
        }
    }

    Ok(())
}

/// Console reporter with live per-action output
pub(crate) struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub(crate) fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Reporter for ConsoleReporter {
    fn on_event(&self, event: &ActionEvent) {
        match event {
            ActionEvent::RunStarted { .. } => {}
            ActionEvent::ActionStarted { label, .. } => {
                if self.verbose {
                    println!("  {} {}", style("▸").dim(), style(label).bold());
                }
            }
            ActionEvent::ActionRetrying { label, attempt, .. } => {
                println!(
                    "  {} {} {}",
                    style("!").yellow(),
                    label,
                    style(format!("(attempt {} failed, retrying)", attempt)).dim()
                );
            }
            ActionEvent::ActionFinished {
                label,
                status,
                duration,
                ..
            } => {
                let elapsed = duration
                    .map(|d| format!("{:.1}s", d.as_secs_f64()))
                    .unwrap_or_default();
                match status {
                    ActionStatus::Passed => {
                        println!(
                            "  {} {} {}",
                            style("✓").green(),
                            style(label).green(),
                            style(elapsed).dim()
                        );
                    }
                    ActionStatus::Cached => {
                        println!(
                            "  {} {} {} {}",
                            style("✓").green(),
                            style(label).green(),
                            style("(cached)").cyan(),
                            style(elapsed).dim()
                        );
                    }
                    ActionStatus::Skipped => {
                        if self.verbose {
                            println!("  {} {}", style("○").yellow(), style(label).dim());
                        }
                    }
                    ActionStatus::Failed | ActionStatus::FailedAndAbort => {
                        println!(
                            "  {} {} {}",
                            style("✗").red(),
                            style(label).red(),
                            style(elapsed).dim()
                        );
                    }
                    ActionStatus::Invalid => {
                        println!(
                            "  {} {} {}",
                            style("○").red(),
                            style(label).dim(),
                            style("(not run)").dim()
                        );
                    }
                    _ => {}
                }
            }
            ActionEvent::RunAborted { label } => {
                println!(
                    "  {} {} {}",
                    style("✗").red().bold(),
                    "aborting run:",
                    style(label).red()
                );
            }
            ActionEvent::RunCancelled => {
                println!("  {} run cancelled", style("!").yellow().bold());
            }
            ActionEvent::RunFinished { .. } => {}
        }
    }
}
