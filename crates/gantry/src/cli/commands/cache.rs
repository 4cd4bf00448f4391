//! Cache command — inspect and maintain the local cache

use std::time::Duration;

use clap::{Args, Subcommand};
use serde_json::json;

use gantry_cache::CacheStore;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub command: CacheSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheSubcommand {
    /// Show entry counts and disk usage
    Status,

    /// Remove entries older than the retention window
    Prune {
        /// Override the configured retention window, in days
        #[arg(long)]
        max_age_days: Option<u64>,
    },

    /// Delete the entire local cache
    Clean {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, root, _graph) = super::load_workspace()?;
        let store = CacheStore::new(&root, &config.cache)?;

        match &self.command {
            CacheSubcommand::Status => self.status(cli, &store),
            CacheSubcommand::Prune { max_age_days } => self.prune(cli, &store, *max_age_days),
            CacheSubcommand::Clean { yes } => self.clean(cli, &store, *yes),
        }
    }

    fn status(&self, cli: &Cli, store: &CacheStore) -> anyhow::Result<()> {
        let stats = store.stats()?;

        if cli.format == OutputFormat::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "manifests": stats.manifest_count,
                    "archives": stats.archive_count,
                    "total_size_bytes": stats.total_size,
                }))?
            );
            return Ok(());
        }

        println!("{}", output::header("Cache status"));
        println!("{}", output::key_value("Manifests", &stats.manifest_count.to_string()));
        println!("{}", output::key_value("Archives", &stats.archive_count.to_string()));
        println!("{}", output::key_value("Disk usage", &stats.formatted_size()));
        Ok(())
    }

    fn prune(
        &self,
        cli: &Cli,
        store: &CacheStore,
        max_age_days: Option<u64>,
    ) -> anyhow::Result<()> {
        let pruned = match max_age_days {
            Some(days) => store
                .local()
                .prune(Duration::from_secs(days * 24 * 60 * 60))?,
            None => store.prune()?,
        };

        if cli.format == OutputFormat::Json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "removed": pruned.removed,
                    "reclaimed_bytes": pruned.reclaimed_bytes,
                }))?
            );
            return Ok(());
        }

        if pruned.removed == 0 {
            output::info("Nothing to prune.");
        } else {
            output::success(&format!(
                "Pruned {} entries ({} reclaimed)",
                pruned.removed,
                format_bytes(pruned.reclaimed_bytes)
            ));
        }
        Ok(())
    }

    fn clean(&self, cli: &Cli, store: &CacheStore, yes: bool) -> anyhow::Result<()> {
        if !yes {
            let confirmed = console::Term::stdout().is_term()
                && confirm("Delete the entire local cache?")?;
            if !confirmed {
                output::info("Aborted.");
                return Ok(());
            }
        }

        store.clear()?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&json!({ "cleared": true }))?);
        } else {
            output::success("Cache cleared.");
        }
        Ok(())
    }
}

/// Minimal y/N prompt on stdin
fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn format_bytes(bytes: u64) -> String {
    let size = bytes as f64;
    if size >= 1024.0 * 1024.0 {
        format!("{:.2} MiB", size / (1024.0 * 1024.0))
    } else if size >= 1024.0 {
        format!("{:.2} KiB", size / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }
}
