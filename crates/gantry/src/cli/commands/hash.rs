//! Hash command — inspect stored hash manifests

use anyhow::Context;
use clap::Args;

use gantry_cache::CacheStore;
use gantry_hash::find_manifest;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Inspect a hash manifest by fingerprint or prefix
#[derive(Debug, Args)]
pub struct HashCommand {
    /// Full fingerprint or unambiguous prefix
    pub query: String,
}

impl HashCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, root, _graph) = super::load_workspace()?;
        let store = CacheStore::new(&root, &config.cache)?;

        let (fingerprint, manifest) = find_manifest(&store.hashes_dir(), &self.query)
            .with_context(|| format!("No stored manifest matching '{}'", self.query))?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            }
            OutputFormat::Text => {
                println!(
                    "{}",
                    output::hash_style().apply_to(fingerprint.as_str())
                );
                println!();
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            }
        }
        Ok(())
    }
}
