//! Content hasher — deterministic fingerprints for task invocations

use std::collections::BTreeMap;
use std::path::Path;

use globset::{Glob, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use gantry_core::workspace::Task;

use crate::error::{HashError, Result};
use crate::manifest::HashManifest;

/// Characters that make an input pattern a glob instead of a literal path
fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Computes fingerprints for task invocations from their resolved inputs
pub struct ContentHasher<'a> {
    root: &'a Path,
}

impl<'a> ContentHasher<'a> {
    /// Create a hasher rooted at the workspace
    pub fn new(root: &'a Path) -> Self {
        Self { root }
    }

    /// Build the hash manifest for a task invocation. The fingerprint is a
    /// deterministic function of the command, args, input file contents,
    /// declared env inputs, and resolved toolchain versions.
    #[instrument(skip_all, fields(target = %task.target))]
    pub fn hash_task(
        &self,
        source: &Path,
        task: &Task,
        toolchains: &[String],
    ) -> Result<HashManifest> {
        let inputs = self.resolve_inputs(source, task)?;

        let mut env = BTreeMap::new();
        for name in &task.input_env {
            let value = std::env::var(name).unwrap_or_default();
            env.insert(name.clone(), value);
        }

        let mut sorted_toolchains = toolchains.to_vec();
        sorted_toolchains.sort();

        let manifest = HashManifest {
            target: task.target.to_string(),
            command: task.command.as_deref().unwrap_or_default().trim().to_string(),
            args: task.args.clone(),
            inputs,
            env,
            toolchains: sorted_toolchains,
        };

        debug!(
            inputs = manifest.inputs.len(),
            hash = %manifest.fingerprint().short(),
            "hashed task invocation"
        );

        Ok(manifest)
    }

    /// Resolve input patterns into (workspace-relative path, content digest)
    /// pairs, sorted by path.
    fn resolve_inputs(&self, source: &Path, task: &Task) -> Result<BTreeMap<String, String>> {
        let mut inputs = BTreeMap::new();
        let project_dir = self.root.join(source);

        let mut glob_builder = GlobSetBuilder::new();
        let mut has_globs = false;

        for pattern in &task.inputs {
            if is_glob(pattern) {
                let anchored = anchor_pattern(source, pattern);
                let glob = Glob::new(&anchored).map_err(|e| HashError::InvalidPattern {
                    pattern: anchored.clone(),
                    message: e.to_string(),
                })?;
                glob_builder.add(glob);
                has_globs = true;
            } else {
                // Literal input file: required unless the task tolerates
                // optional inputs
                let file = project_dir.join(pattern);
                if !file.is_file() {
                    if task.options.optional_inputs {
                        continue;
                    }
                    return Err(HashError::MissingInput {
                        target: task.target.to_string(),
                        path: file,
                    });
                }

                let relative = anchor_pattern(source, pattern);
                inputs.insert(relative, digest_file(&file)?);
            }
        }

        if has_globs && project_dir.exists() {
            let globset = glob_builder.build().map_err(|e| HashError::InvalidPattern {
                pattern: task.inputs.join(", "),
                message: e.to_string(),
            })?;

            for entry in WalkDir::new(&project_dir)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }

                let relative = entry
                    .path()
                    .strip_prefix(self.root)
                    .unwrap_or(entry.path());
                let relative_str = relative.to_string_lossy().replace('\\', "/");

                if globset.is_match(&relative_str) {
                    inputs.insert(relative_str, digest_file(entry.path())?);
                }
            }
        }

        Ok(inputs)
    }
}

/// Prefix a project-relative pattern with the project source path
fn anchor_pattern(source: &Path, pattern: &str) -> String {
    if source.as_os_str().is_empty() || source == Path::new(".") {
        pattern.to_string()
    } else {
        format!("{}/{}", source.display(), pattern).replace('\\', "/")
    }
}

/// SHA-256 digest of a file's contents
fn digest_file(path: &Path) -> Result<String> {
    let contents = std::fs::read(path).map_err(HashError::Io)?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(format!("{:x}", hasher.finalize()))
}
