//! Graph command — export project and action graphs

use anyhow::Context;
use clap::Args;

use gantry_core::workspace::expand_targets;
use gantry_core::{GraphExport, TargetExpr};
use gantry_pipeline::ActionGraph;

use crate::cli::{Cli, OutputFormat};

/// Export the project or action graph
#[derive(Debug, Args)]
pub struct GraphCommand {
    /// Targets to build an action graph for (omit for the project graph)
    pub targets: Vec<String>,

    /// Emit Graphviz DOT instead of JSON
    #[arg(long)]
    pub dot: bool,
}

impl GraphCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (_config, _root, graph) = super::load_workspace()?;

        let (export, name) = if self.targets.is_empty() {
            (graph.export_project_graph(), "projects")
        } else {
            let parsed: Vec<TargetExpr> = self
                .targets
                .iter()
                .map(|s| TargetExpr::parse(s))
                .collect::<Result<_, _>>()
                .context("Invalid target expression")?;
            let expanded = expand_targets(&parsed, &graph.all_targets())?;
            let action_graph = ActionGraph::build(&graph, &expanded)?;
            (action_graph.export(), "actions")
        };

        print_graph(cli, &export, name, self.dot)
    }
}

fn print_graph(cli: &Cli, export: &GraphExport, name: &str, dot: bool) -> anyhow::Result<()> {
    if dot {
        print!("{}", export.to_dot(name));
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(export)?),
        OutputFormat::Text => {
            println!("{} ({} nodes, {} edges)", name, export.nodes.len(), export.edges.len());
            for node in &export.nodes {
                println!("  {}", node.label);
                for edge in export.edges.iter().filter(|e| e.target == node.id) {
                    println!("    <- {}", edge.source);
                }
            }
        }
    }
    Ok(())
}
