//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Workspace-level configuration for Gantry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Version of the config schema
    #[serde(rename = "$schema")]
    pub schema: Option<String>,

    /// Workspace name
    pub name: Option<String>,

    /// Projects in the workspace, keyed by ID, pointing at source paths
    /// relative to the workspace root
    pub projects: BTreeMap<String, PathBuf>,

    /// Runner configuration
    pub runner: RunnerConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Affected-detection configuration
    pub affected: AffectedConfig,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            schema: None,
            name: None,
            projects: BTreeMap::new(),
            runner: RunnerConfig::default(),
            cache: CacheConfig::default(),
            affected: AffectedConfig::default(),
        }
    }
}

/// Runner (execution pipeline) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum concurrent actions; defaults to available parallelism
    pub concurrency: Option<usize>,

    /// Abort the whole run on the first failure
    pub bail: bool,

    /// Default retry count for tasks that do not declare one
    pub retry_count: u8,

    /// Seconds after which an action is reported as slow
    pub slow_threshold_secs: u64,

    /// Grace period in seconds before in-flight actions are killed on
    /// cancellation
    pub grace_period_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            bail: false,
            retry_count: 0,
            slow_threshold_secs: 60,
            grace_period_secs: 10,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled at all
    pub enabled: bool,

    /// Override for the local cache directory (default: `.gantry/cache`)
    pub dir: Option<PathBuf>,

    /// Entries unused for longer than this are removed by `cache prune`
    pub max_age_days: u64,

    /// Optional remote cache backend
    pub remote: Option<RemoteCacheConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            max_age_days: 30,
            remote: None,
        }
    }
}

/// Remote cache backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// Base URL of the content-addressable store
    pub url: String,

    /// Compression applied to blobs before transfer
    #[serde(default)]
    pub compression: CompressionKind,
}

/// Blob compression choice for remote transfers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionKind {
    /// No compression
    None,
    /// Gzip via flate2
    #[default]
    Gzip,
}

/// Affected-detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectedConfig {
    /// Treat tasks with no declared inputs as always affected by any
    /// touched file (off by default; such tasks then run only when
    /// explicitly requested)
    pub on_no_inputs: bool,

    /// Default base revision for touched-file comparison
    pub default_base: String,
}

impl Default for AffectedConfig {
    fn default() -> Self {
        Self {
            on_no_inputs: false,
            default_base: "main".to_string(),
        }
    }
}

/// Per-project configuration (loaded from the project's source directory)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// IDs of projects this project depends on
    #[serde(alias = "depends_on")]
    pub dependencies: Vec<String>,

    /// Arbitrary tags for grouping/filtering
    pub tags: Vec<String>,

    /// Primary language/stack of the project
    pub language: Option<String>,

    /// Toolchain required by this project's tasks (e.g. "node@20")
    pub toolchain: Option<String>,

    /// Tasks declared by this project, keyed by name
    pub tasks: BTreeMap<String, TaskConfig>,
}

/// Per-task configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Command to execute
    pub command: Option<String>,

    /// Arguments appended to the command
    pub args: Vec<String>,

    /// Input file patterns (globs, relative to the project source)
    pub inputs: Vec<String>,

    /// Environment variable names treated as hash/affected inputs
    pub env_inputs: Vec<String>,

    /// Output paths/globs produced by the task
    pub outputs: Vec<String>,

    /// Environment variables passed to the command
    pub env: HashMap<String, String>,

    /// Task dependencies: `"build"` (same project) or `"other:build"`
    pub deps: Vec<String>,

    /// Execution options
    pub options: TaskOptionsConfig,
}

/// Execution options for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptionsConfig {
    /// Whether results may be cached
    pub cache: bool,

    /// When the task runs in CI mode
    pub run_in_ci: RunInCi,

    /// Extra attempts after a failure
    pub retry_count: u8,

    /// Per-action timeout in seconds
    pub timeout_secs: Option<u64>,

    /// A failure aborts the whole run instead of only dependents
    pub abort_on_failure: bool,

    /// Missing declared input files are tolerated instead of failing the
    /// fingerprint computation
    pub optional_inputs: bool,
}

impl Default for TaskOptionsConfig {
    fn default() -> Self {
        Self {
            cache: true,
            run_in_ci: RunInCi::default(),
            retry_count: 0,
            timeout_secs: None,
            abort_on_failure: false,
            optional_inputs: false,
        }
    }
}

/// CI-mode inclusion policy for a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunInCi {
    /// Run whenever the task is affected (default)
    #[default]
    Affected,
    /// Always run in CI regardless of affected status
    Always,
    /// Never run in CI
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_config_defaults() {
        let config = WorkspaceConfig::default();
        assert!(config.projects.is_empty());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_age_days, 30);
        assert!(config.runner.concurrency.is_none());
        assert!(!config.affected.on_no_inputs);
    }

    #[test]
    fn test_task_options_defaults() {
        let opts = TaskOptionsConfig::default();
        assert!(opts.cache);
        assert_eq!(opts.run_in_ci, RunInCi::Affected);
        assert_eq!(opts.retry_count, 0);
        assert!(!opts.abort_on_failure);
    }

    #[test]
    fn test_parse_workspace_toml() {
        let toml = r#"
            name = "demo"

            [projects]
            lib = "packages/lib"
            app = "packages/app"

            [runner]
            concurrency = 4
            bail = true

            [cache.remote]
            url = "https://cache.example.com"
            compression = "none"
        "#;

        let config: WorkspaceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.name.as_deref(), Some("demo"));
        assert_eq!(config.projects.len(), 2);
        assert_eq!(config.runner.concurrency, Some(4));
        assert!(config.runner.bail);

        let remote = config.cache.remote.unwrap();
        assert_eq!(remote.url, "https://cache.example.com");
        assert_eq!(remote.compression, CompressionKind::None);
    }

    #[test]
    fn test_parse_project_yaml() {
        let yaml = r#"
            dependencies: [lib]
            toolchain: node@20

            tasks:
              build:
                command: npm run build
                inputs: ["src/**/*"]
                outputs: ["dist"]
                deps: ["lib:build"]
                options:
                  retry_count: 2
                  run_in_ci: always
        "#;

        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.dependencies, vec!["lib"]);
        assert_eq!(config.toolchain.as_deref(), Some("node@20"));

        let build = config.tasks.get("build").unwrap();
        assert_eq!(build.command.as_deref(), Some("npm run build"));
        assert_eq!(build.deps, vec!["lib:build"]);
        assert_eq!(build.options.retry_count, 2);
        assert_eq!(build.options.run_in_ci, RunInCi::Always);
    }
}
