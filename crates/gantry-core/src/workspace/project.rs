//! Project and task types

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ProjectConfig, RunInCi, TaskConfig};

use super::target::Target;

/// A project in the workspace. Immutable once the graph is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique project ID
    pub id: String,
    /// Source path relative to the workspace root
    pub source: PathBuf,
    /// IDs of projects this project depends on
    pub dependencies: Vec<String>,
    /// Arbitrary grouping tags
    pub tags: Vec<String>,
    /// Primary language/stack
    pub language: Option<String>,
    /// Toolchain requirement (e.g. "node@20")
    pub toolchain: Option<String>,
    /// Tasks declared by this project, keyed by name
    pub tasks: BTreeMap<String, Task>,
}

impl Project {
    /// Build a project from its configuration
    pub fn from_config(id: &str, source: PathBuf, config: ProjectConfig) -> Self {
        let mut tasks = BTreeMap::new();

        for (name, task_config) in config.tasks {
            let target = Target::new(id, &name);
            tasks.insert(name, Task::from_config(target, task_config));
        }

        Self {
            id: id.to_string(),
            source,
            dependencies: config.dependencies,
            tags: config.tags,
            language: config.language,
            toolchain: config.toolchain,
            tasks,
        }
    }

    /// Get a task by name
    pub fn get_task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }
}

/// A task within a project. Immutable once the graph is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// The task's fully-qualified target
    pub target: Target,
    /// Command to execute
    pub command: Option<String>,
    /// Arguments appended to the command
    pub args: Vec<String>,
    /// Input globs relative to the project source
    pub inputs: Vec<String>,
    /// Environment variable names treated as inputs
    pub input_env: Vec<String>,
    /// Output paths/globs relative to the project source
    pub outputs: Vec<String>,
    /// Environment variables passed to the command
    pub env: HashMap<String, String>,
    /// Raw dependency references (`"build"` or `"other:build"`), resolved
    /// to concrete targets during graph construction
    pub dep_refs: Vec<String>,
    /// Resolved dependency targets (populated by the graph builder)
    pub deps: Vec<Target>,
    /// Execution options
    pub options: TaskOptions,
}

impl Task {
    /// Build a task from its configuration
    pub fn from_config(target: Target, config: TaskConfig) -> Self {
        Self {
            target,
            command: config.command,
            args: config.args,
            inputs: config.inputs,
            input_env: config.env_inputs,
            outputs: config.outputs,
            env: config.env,
            dep_refs: config.deps,
            deps: Vec::new(),
            options: TaskOptions {
                cache: config.options.cache,
                run_in_ci: config.options.run_in_ci,
                retry_count: config.options.retry_count,
                timeout: config.options.timeout_secs.map(Duration::from_secs),
                abort_on_failure: config.options.abort_on_failure,
                optional_inputs: config.options.optional_inputs,
            },
        }
    }

    /// The full command line (command + args) as a shell string
    pub fn command_line(&self) -> Option<String> {
        let command = self.command.as_ref()?;
        if self.args.is_empty() {
            Some(command.clone())
        } else {
            Some(format!("{} {}", command, self.args.join(" ")))
        }
    }

    /// Whether the task declares no inputs at all (files or env)
    pub fn has_no_inputs(&self) -> bool {
        self.inputs.is_empty() && self.input_env.is_empty()
    }
}

/// Resolved execution options for a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Whether results may be cached
    pub cache: bool,
    /// CI-mode inclusion policy
    pub run_in_ci: RunInCi,
    /// Extra attempts after a failure
    pub retry_count: u8,
    /// Per-action timeout
    pub timeout: Option<Duration>,
    /// A failure aborts the whole run
    pub abort_on_failure: bool,
    /// Missing declared inputs are tolerated
    pub optional_inputs: bool,
}
