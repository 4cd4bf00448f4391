//! Affected-set resolution — intersect touched files with task inputs

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TargetError, VcsError};

use super::graph::WorkspaceGraph;
use super::project::Task;
use super::target::Target;

/// Why a target is part of the affected set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "reason", content = "value")]
pub enum AffectedReason {
    /// A touched file matched the task's inputs
    TouchedFile(PathBuf),
    /// A declared input environment variable is set
    EnvironmentVariable(String),
    /// The target was explicitly requested
    ExplicitlyRequested,
    /// The task is configured to always run in CI
    AlwaysRunInCi,
}

impl std::fmt::Display for AffectedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TouchedFile(file) => write!(f, "touched file '{}'", file.display()),
            Self::EnvironmentVariable(var) => write!(f, "environment variable '{}'", var),
            Self::ExplicitlyRequested => write!(f, "explicitly requested"),
            Self::AlwaysRunInCi => write!(f, "always runs in CI"),
        }
    }
}

/// The resolved affected set: targets mapped to the reason they are in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AffectedSet {
    targets: BTreeMap<Target, AffectedReason>,
}

impl AffectedSet {
    /// Targets in the set, in deterministic order
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.keys()
    }

    /// Reason a target is in the set
    pub fn reason(&self, target: &Target) -> Option<&AffectedReason> {
        self.targets.get(target)
    }

    /// Whether the set contains a target
    pub fn contains(&self, target: &Target) -> bool {
        self.targets.contains_key(target)
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Number of targets in the set
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    fn insert(&mut self, target: Target, reason: AffectedReason) {
        self.targets.entry(target).or_insert(reason);
    }
}

/// Resolves the minimal set of targets requiring execution from touched
/// files and explicit requests. Affected status is computed from direct
/// input overlap only; dependency edges are handled later by the action
/// graph builder.
pub struct AffectedResolver<'a> {
    graph: &'a WorkspaceGraph,
    touched_files: &'a HashSet<PathBuf>,
    ci_mode: bool,
    affected_on_no_inputs: bool,
}

impl<'a> AffectedResolver<'a> {
    /// Create a new resolver
    pub fn new(graph: &'a WorkspaceGraph, touched_files: &'a HashSet<PathBuf>) -> Self {
        Self {
            graph,
            touched_files,
            ci_mode: false,
            affected_on_no_inputs: false,
        }
    }

    /// Apply CI-mode policy (`run_in_ci` forcing and exclusion)
    pub fn with_ci_mode(mut self, ci_mode: bool) -> Self {
        self.ci_mode = ci_mode;
        self
    }

    /// Treat tasks with no declared inputs as affected by any touched file
    pub fn with_affected_on_no_inputs(mut self, enabled: bool) -> Self {
        self.affected_on_no_inputs = enabled;
        self
    }

    /// Resolve the affected set. `requested` targets are filtered by
    /// affected status; in CI mode, `run_in_ci = always` tasks are added
    /// regardless and `run_in_ci = never` tasks are dropped.
    pub fn resolve(&self, requested: &[Target]) -> Result<AffectedSet> {
        debug!(
            requested = requested.len(),
            touched_files = self.touched_files.len(),
            ci_mode = self.ci_mode,
            "resolving affected set"
        );

        let mut set = AffectedSet::default();

        for target in requested {
            let task = self.graph.get_task(target)?;

            if self.ci_mode {
                match task.options.run_in_ci {
                    crate::config::RunInCi::Never => continue,
                    crate::config::RunInCi::Always => {
                        set.insert(target.clone(), AffectedReason::AlwaysRunInCi);
                        continue;
                    }
                    crate::config::RunInCi::Affected => {}
                }
            }

            if let Some(reason) = self.is_task_affected(task)? {
                set.insert(target.clone(), reason);
            }
        }

        info!(affected = set.len(), "affected set resolved");
        Ok(set)
    }

    /// Include every requested target without affected filtering (used by
    /// plain runs; CI `never` tasks are still dropped in CI mode)
    pub fn resolve_all(&self, requested: &[Target]) -> Result<AffectedSet> {
        let mut set = AffectedSet::default();

        for target in requested {
            let task = self.graph.get_task(target)?;
            if self.ci_mode && task.options.run_in_ci == crate::config::RunInCi::Never {
                continue;
            }
            set.insert(target.clone(), AffectedReason::ExplicitlyRequested);
        }

        Ok(set)
    }

    /// Check whether a single task is affected by the touched set
    fn is_task_affected(&self, task: &Task) -> Result<Option<AffectedReason>> {
        for var_name in &task.input_env {
            if let Ok(value) = std::env::var(var_name) {
                if !value.is_empty() {
                    return Ok(Some(AffectedReason::EnvironmentVariable(var_name.clone())));
                }
            }
        }

        if task.has_no_inputs() {
            if self.affected_on_no_inputs {
                return Ok(self
                    .touched_files
                    .iter()
                    .next()
                    .map(|f| AffectedReason::TouchedFile(f.clone())));
            }
            return Ok(None);
        }

        let project = self.graph.project(&task.target.project)?;
        let globset = build_input_globset(&project.source, &task.inputs)?;

        for file in self.touched_files {
            if globset.is_match(file) {
                return Ok(Some(AffectedReason::TouchedFile(file.clone())));
            }
        }

        Ok(None)
    }
}

/// Build a globset for task inputs, anchored at the project source path
fn build_input_globset(source: &Path, inputs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();

    for input in inputs {
        let pattern = if source.as_os_str().is_empty() || source == Path::new(".") {
            input.clone()
        } else {
            format!("{}/{}", source.display(), input)
        };

        let glob = Glob::new(&pattern).map_err(|e| TargetError::InvalidGlob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|e| {
        TargetError::InvalidGlob {
            pattern: inputs.join(", "),
            message: e.to_string(),
        }
        .into()
    })
}

/// Get files changed between two git revisions, relative to the root
pub fn touched_files_from_git(
    root: &Path,
    base: Option<&str>,
    head: &str,
) -> Result<HashSet<PathBuf>> {
    use std::process::Command;

    let mut cmd = Command::new("git");
    cmd.current_dir(root);

    if let Some(base) = base {
        cmd.args(["diff", "--name-only", base, head]);
    } else {
        cmd.args(["ls-files"]);
    }

    let output = cmd
        .output()
        .map_err(|e| VcsError::CommandFailed(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VcsError::CommandFailed(stderr.to_string()).into());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ProjectConfig, RunInCi, TaskConfig, TaskOptionsConfig, WorkspaceConfig,
    };
    use std::collections::BTreeMap;

    fn build_graph() -> WorkspaceGraph {
        let mut workspace = WorkspaceConfig::default();
        workspace
            .projects
            .insert("lib".to_string(), "packages/lib".into());
        workspace
            .projects
            .insert("tools".to_string(), "packages/tools".into());

        let mut lib_tasks = BTreeMap::new();
        lib_tasks.insert(
            "build".to_string(),
            TaskConfig {
                command: Some("make build".to_string()),
                inputs: vec!["src/**/*".to_string()],
                ..Default::default()
            },
        );
        lib_tasks.insert(
            "clean".to_string(),
            TaskConfig {
                command: Some("make clean".to_string()),
                ..Default::default()
            },
        );
        lib_tasks.insert(
            "deploy".to_string(),
            TaskConfig {
                command: Some("make deploy".to_string()),
                options: TaskOptionsConfig {
                    run_in_ci: RunInCi::Always,
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        let mut tools_tasks = BTreeMap::new();
        tools_tasks.insert(
            "lint".to_string(),
            TaskConfig {
                command: Some("make lint".to_string()),
                inputs: vec!["**/*.sh".to_string()],
                ..Default::default()
            },
        );

        let mut configs = BTreeMap::new();
        configs.insert(
            "lib".to_string(),
            ProjectConfig {
                tasks: lib_tasks,
                ..Default::default()
            },
        );
        configs.insert(
            "tools".to_string(),
            ProjectConfig {
                tasks: tools_tasks,
                ..Default::default()
            },
        );

        WorkspaceGraph::build("/tmp/ws".into(), &workspace, configs).unwrap()
    }

    #[test]
    fn test_touched_file_affects_matching_task_only() {
        let graph = build_graph();
        let touched: HashSet<PathBuf> =
            [PathBuf::from("packages/lib/src/main.rs")].into_iter().collect();

        let resolver = AffectedResolver::new(&graph, &touched);
        let requested = graph.all_targets();
        let set = resolver.resolve(&requested).unwrap();

        assert!(set.contains(&Target::new("lib", "build")));
        assert!(!set.contains(&Target::new("tools", "lint")));
    }

    #[test]
    fn test_no_inputs_not_auto_affected() {
        let graph = build_graph();
        let touched: HashSet<PathBuf> =
            [PathBuf::from("packages/lib/src/main.rs")].into_iter().collect();

        let resolver = AffectedResolver::new(&graph, &touched);
        let set = resolver.resolve(&graph.all_targets()).unwrap();

        // "clean" declares no inputs and is not forced
        assert!(!set.contains(&Target::new("lib", "clean")));
    }

    #[test]
    fn test_no_inputs_affected_when_configured() {
        let graph = build_graph();
        let touched: HashSet<PathBuf> =
            [PathBuf::from("anything.txt")].into_iter().collect();

        let resolver = AffectedResolver::new(&graph, &touched).with_affected_on_no_inputs(true);
        let set = resolver.resolve(&[Target::new("lib", "clean")]).unwrap();

        assert!(set.contains(&Target::new("lib", "clean")));
    }

    #[test]
    fn test_run_in_ci_always_forced() {
        let graph = build_graph();
        let touched: HashSet<PathBuf> = HashSet::new();

        let resolver = AffectedResolver::new(&graph, &touched).with_ci_mode(true);
        let set = resolver.resolve(&graph.all_targets()).unwrap();

        assert_eq!(
            set.reason(&Target::new("lib", "deploy")),
            Some(&AffectedReason::AlwaysRunInCi)
        );
    }

    #[test]
    fn test_explicit_request_without_filtering() {
        let graph = build_graph();
        let touched: HashSet<PathBuf> = HashSet::new();

        let resolver = AffectedResolver::new(&graph, &touched);
        let set = resolver
            .resolve_all(&[Target::new("lib", "clean")])
            .unwrap();

        assert_eq!(
            set.reason(&Target::new("lib", "clean")),
            Some(&AffectedReason::ExplicitlyRequested)
        );
    }

    #[test]
    fn test_env_var_input_affects_task() {
        let graph = {
            let mut workspace = WorkspaceConfig::default();
            workspace.projects.insert("lib".to_string(), "lib".into());

            let mut tasks = BTreeMap::new();
            tasks.insert(
                "build".to_string(),
                TaskConfig {
                    command: Some("make".to_string()),
                    env_inputs: vec!["GANTRY_TEST_AFFECTED_VAR".to_string()],
                    ..Default::default()
                },
            );

            let mut configs = BTreeMap::new();
            configs.insert(
                "lib".to_string(),
                ProjectConfig {
                    tasks,
                    ..Default::default()
                },
            );
            WorkspaceGraph::build("/tmp/ws".into(), &workspace, configs).unwrap()
        };

        std::env::set_var("GANTRY_TEST_AFFECTED_VAR", "1");
        let touched: HashSet<PathBuf> = HashSet::new();
        let resolver = AffectedResolver::new(&graph, &touched);
        let set = resolver.resolve(&[Target::new("lib", "build")]).unwrap();
        std::env::remove_var("GANTRY_TEST_AFFECTED_VAR");

        assert_eq!(
            set.reason(&Target::new("lib", "build")),
            Some(&AffectedReason::EnvironmentVariable(
                "GANTRY_TEST_AFFECTED_VAR".to_string()
            ))
        );
    }
}
