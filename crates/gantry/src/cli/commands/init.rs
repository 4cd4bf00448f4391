//! Init command — scaffold a workspace configuration

use clap::Args;

use gantry_core::config::{config_file_names, DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML};

use crate::cli::output;
use crate::cli::Cli;

/// Initialize a new Gantry workspace configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;

        if !self.force {
            for name in config_file_names() {
                if cwd.join(name).exists() {
                    anyhow::bail!(
                        "A workspace configuration already exists at {} (use --force to overwrite)",
                        cwd.join(name).display()
                    );
                }
            }
        }

        let path = cwd.join(DEFAULT_CONFIG_TOML);
        std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;

        if !cli.quiet {
            output::success(&format!("Created {}", path.display()));
            output::info("Add a project.toml to each project directory to define tasks.");
        }
        Ok(())
    }
}
