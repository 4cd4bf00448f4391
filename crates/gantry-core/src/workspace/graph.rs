//! Workspace graph — project and task DAGs

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::{load_project_config, validate_project_config, ProjectConfig, WorkspaceConfig};
use crate::error::{ConfigError, GraphError, Result};

use super::project::{Project, Task};
use super::target::Target;

/// A node in a graph export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node ID
    pub id: String,
    /// Human-readable label
    pub label: String,
}

/// An edge in a graph export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Edge ID
    pub id: String,
    /// Source node ID
    pub source: String,
    /// Target node ID
    pub target: String,
}

/// Read-only export of a graph for visualization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    /// All nodes
    pub nodes: Vec<GraphNode>,
    /// All edges
    pub edges: Vec<GraphEdge>,
}

impl GraphExport {
    /// Render the export in DOT format
    pub fn to_dot(&self, name: &str) -> String {
        let mut dot = format!("digraph {} {{\n", name);
        for node in &self.nodes {
            dot.push_str(&format!("  \"{}\" [label=\"{}\"];\n", node.id, node.label));
        }
        for edge in &self.edges {
            dot.push_str(&format!("  \"{}\" -> \"{}\";\n", edge.source, edge.target));
        }
        dot.push_str("}\n");
        dot
    }
}

/// The workspace graph: projects with dependency edges, and within them
/// tasks with dependency edges (including cross-project references).
/// Immutable for a given run once built.
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
    root: PathBuf,
    projects: BTreeMap<String, Project>,
    /// Topologically sorted project IDs (dependencies first)
    project_order: Vec<String>,
    /// Topologically sorted targets (dependencies first)
    target_order: Vec<Target>,
    /// Reverse task dependency map
    task_dependents: HashMap<Target, Vec<Target>>,
}

impl WorkspaceGraph {
    /// Load project configurations from disk and build the graph
    #[instrument(skip_all, fields(projects = config.projects.len()))]
    pub fn load(root: &Path, config: &WorkspaceConfig) -> Result<Self> {
        let mut project_configs = BTreeMap::new();

        for (id, source) in &config.projects {
            let project_dir = root.join(source);
            if !project_dir.exists() {
                return Err(ConfigError::MissingProjectSource {
                    id: id.clone(),
                    path: project_dir,
                }
                .into());
            }

            let project_config = load_project_config(&project_dir)?;
            validate_project_config(id, &project_config, config)?;
            project_configs.insert(id.clone(), project_config);
        }

        Self::build(root.to_path_buf(), config, project_configs)
    }

    /// Build the graph from already-loaded project configurations
    pub fn build(
        root: PathBuf,
        config: &WorkspaceConfig,
        project_configs: BTreeMap<String, ProjectConfig>,
    ) -> Result<Self> {
        let mut projects: BTreeMap<String, Project> = BTreeMap::new();

        for (id, project_config) in project_configs {
            let source = config
                .projects
                .get(&id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownProject(id.clone()))?;
            projects.insert(id.clone(), Project::from_config(&id, source, project_config));
        }

        // Validate project dependency references
        for project in projects.values() {
            for dep in &project.dependencies {
                if !projects.contains_key(dep) {
                    return Err(ConfigError::UnknownProject(dep.clone()).into());
                }
            }
        }

        // Resolve raw task dependency references into concrete targets
        let resolved = Self::resolve_task_deps(&projects)?;
        for (target, deps) in resolved {
            if let Some(project) = projects.get_mut(&target.project) {
                if let Some(task) = project.tasks.get_mut(&target.task) {
                    task.deps = deps;
                }
            }
        }

        // Project-level topological order
        let project_deps: BTreeMap<String, Vec<String>> = projects
            .values()
            .map(|p| (p.id.clone(), p.dependencies.clone()))
            .collect();
        let project_order = topological_sort(&project_deps)?;

        // Task-level topological order and reverse edges
        let task_deps: BTreeMap<String, Vec<String>> = projects
            .values()
            .flat_map(|p| p.tasks.values())
            .map(|t| {
                (
                    t.target.to_string(),
                    t.deps.iter().map(Target::to_string).collect(),
                )
            })
            .collect();
        let target_order: Vec<Target> = topological_sort(&task_deps)?
            .into_iter()
            .map(|s| Target::parse(&s))
            .collect::<Result<_>>()?;

        let mut task_dependents: HashMap<Target, Vec<Target>> = HashMap::new();
        for project in projects.values() {
            for task in project.tasks.values() {
                for dep in &task.deps {
                    task_dependents
                        .entry(dep.clone())
                        .or_default()
                        .push(task.target.clone());
                }
            }
        }

        info!(
            projects = projects.len(),
            targets = target_order.len(),
            "workspace graph built"
        );

        Ok(Self {
            root,
            projects,
            project_order,
            target_order,
            task_dependents,
        })
    }

    /// Resolve `dep_refs` strings into concrete targets, checking that every
    /// referenced project and task exists.
    fn resolve_task_deps(
        projects: &BTreeMap<String, Project>,
    ) -> Result<Vec<(Target, Vec<Target>)>> {
        let mut resolved = Vec::new();

        for project in projects.values() {
            for task in project.tasks.values() {
                let mut deps = Vec::new();

                for dep_ref in &task.dep_refs {
                    let dep_target = match dep_ref.split_once(':') {
                        Some((dep_project, dep_task)) => {
                            let dep_project = if dep_project.is_empty() {
                                &project.id
                            } else {
                                dep_project
                            };
                            Target::new(dep_project, dep_task)
                        }
                        None => Target::new(&project.id, dep_ref),
                    };

                    let dep_exists = projects
                        .get(&dep_target.project)
                        .is_some_and(|p| p.tasks.contains_key(&dep_target.task));

                    if !dep_exists {
                        if !projects.contains_key(&dep_target.project) {
                            return Err(ConfigError::UnknownProject(dep_target.project).into());
                        }
                        return Err(ConfigError::UnknownTask {
                            project: dep_target.project,
                            task: dep_target.task,
                        }
                        .into());
                    }

                    deps.push(dep_target);
                }

                resolved.push((task.target.clone(), deps));
            }
        }

        Ok(resolved)
    }

    /// Workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a project by ID
    pub fn project(&self, id: &str) -> Result<&Project> {
        self.projects
            .get(id)
            .ok_or_else(|| ConfigError::UnknownProject(id.to_string()).into())
    }

    /// All projects
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Get a task by target
    pub fn get_task(&self, target: &Target) -> Result<&Task> {
        self.projects
            .get(&target.project)
            .and_then(|p| p.tasks.get(&target.task))
            .ok_or_else(|| {
                ConfigError::UnknownTask {
                    project: target.project.clone(),
                    task: target.task.clone(),
                }
                .into()
            })
    }

    /// All concrete targets in the workspace
    pub fn all_targets(&self) -> Vec<Target> {
        self.projects
            .values()
            .flat_map(|p| p.tasks.values())
            .map(|t| t.target.clone())
            .collect()
    }

    /// Project IDs in topological order (dependencies first)
    pub fn sorted_projects(&self) -> &[String] {
        &self.project_order
    }

    /// Targets in topological order (dependencies first)
    pub fn sorted_targets(&self) -> &[Target] {
        &self.target_order
    }

    /// Targets grouped into waves: every target in a wave only depends on
    /// targets in earlier waves, so a wave could run in parallel.
    pub fn target_waves(&self) -> Vec<Vec<Target>> {
        let mut depth: HashMap<&Target, usize> = HashMap::new();
        let mut waves: Vec<Vec<Target>> = Vec::new();

        for target in &self.target_order {
            let level = self
                .projects
                .get(&target.project)
                .and_then(|p| p.tasks.get(&target.task))
                .map(|t| {
                    t.deps
                        .iter()
                        .filter_map(|d| depth.get(d))
                        .map(|d| d + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);

            depth.insert(target, level);
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(target.clone());
        }

        waves
    }

    /// Tasks that directly depend on a target
    pub fn task_dependents(&self, target: &Target) -> &[Target] {
        self.task_dependents
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Export the project graph for visualization
    pub fn export_project_graph(&self) -> GraphExport {
        let nodes = self
            .projects
            .values()
            .map(|p| GraphNode {
                id: p.id.clone(),
                label: p.id.clone(),
            })
            .collect();

        let mut edges = Vec::new();
        for project in self.projects.values() {
            for dep in &project.dependencies {
                edges.push(GraphEdge {
                    id: format!("{} -> {}", project.id, dep),
                    source: project.id.clone(),
                    target: dep.clone(),
                });
            }
        }

        GraphExport { nodes, edges }
    }
}

/// Topological sort using Kahn's algorithm. Returns node IDs with
/// dependencies before dependents, a `GraphError::Cycle` naming the full
/// cycle path, or a `GraphError::DanglingEdge` when an edge points at a
/// node that is not in the graph.
pub fn topological_sort(deps: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    let mut sorted: Vec<String> = Vec::new();

    for (id, node_deps) in deps {
        for dep in node_deps {
            if !deps.contains_key(dep) {
                return Err(GraphError::DanglingEdge {
                    from: id.clone(),
                    to: dep.clone(),
                }
                .into());
            }
            dependents.entry(dep).or_default().push(id);
        }

        in_degree.insert(id, node_deps.len());
        if node_deps.is_empty() {
            queue.push_back(id);
        }
    }

    while let Some(id) = queue.pop_front() {
        sorted.push(id.to_string());

        if let Some(deps_of) = dependents.get(id) {
            for dependent in deps_of {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if sorted.len() != deps.len() {
        let in_sorted: HashSet<&str> = sorted.iter().map(String::as_str).collect();
        let cyclic: Vec<&str> = deps
            .keys()
            .map(String::as_str)
            .filter(|id| !in_sorted.contains(id))
            .collect();

        let path = find_cycle(deps, &cyclic).unwrap_or_else(|| cyclic.iter().map(|s| s.to_string()).collect());
        return Err(GraphError::Cycle(path.join(" -> ")).into());
    }

    Ok(sorted)
}

/// Find a concrete cycle path among the given cyclic nodes. The returned
/// path ends where it started (e.g. `a -> b -> a`).
fn find_cycle(deps: &BTreeMap<String, Vec<String>>, cyclic: &[&str]) -> Option<Vec<String>> {
    fn dfs<'a>(
        deps: &'a BTreeMap<String, Vec<String>>,
        current: &'a str,
        cyclic: &[&str],
        path: &mut Vec<&'a str>,
        on_path: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if on_path.contains(current) {
            let start = path.iter().position(|n| *n == current)?;
            let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(current.to_string());
            return Some(cycle);
        }

        if !cyclic.contains(&current) {
            return None;
        }

        path.push(current);
        on_path.insert(current);

        if let Some(node_deps) = deps.get(current) {
            for dep in node_deps {
                if let Some(cycle) = dfs(deps, dep, cyclic, path, on_path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_path.remove(current);
        None
    }

    let start = cyclic.first()?;
    let mut path = Vec::new();
    let mut on_path = HashSet::new();
    dfs(deps, start, cyclic, &mut path, &mut on_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskConfig;

    fn workspace_config(projects: &[&str]) -> WorkspaceConfig {
        let mut config = WorkspaceConfig::default();
        for id in projects {
            config.projects.insert(id.to_string(), id.into());
        }
        config
    }

    fn project_config(deps: &[&str], tasks: &[(&str, &[&str])]) -> ProjectConfig {
        let mut config = ProjectConfig {
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        for (name, task_deps) in tasks {
            config.tasks.insert(
                name.to_string(),
                TaskConfig {
                    command: Some(format!("run {}", name)),
                    deps: task_deps.iter().map(|s| s.to_string()).collect(),
                    ..Default::default()
                },
            );
        }
        config
    }

    fn build_graph(
        configs: Vec<(&str, ProjectConfig)>,
    ) -> Result<WorkspaceGraph> {
        let ids: Vec<&str> = configs.iter().map(|(id, _)| *id).collect();
        let workspace = workspace_config(&ids);
        let project_configs = configs
            .into_iter()
            .map(|(id, c)| (id.to_string(), c))
            .collect();
        WorkspaceGraph::build("/tmp/ws".into(), &workspace, project_configs)
    }

    #[test]
    fn test_build_graph_nodes_and_edges() {
        let graph = build_graph(vec![
            ("lib", project_config(&[], &[("build", &[])])),
            ("app", project_config(&["lib"], &[("build", &["lib:build"])])),
        ])
        .unwrap();

        assert_eq!(graph.projects().count(), 2);
        assert_eq!(graph.all_targets().len(), 2);

        let app_build = graph.get_task(&Target::new("app", "build")).unwrap();
        assert_eq!(app_build.deps, vec![Target::new("lib", "build")]);
    }

    #[test]
    fn test_topological_order() {
        let graph = build_graph(vec![
            ("lib", project_config(&[], &[("build", &[])])),
            ("app", project_config(&["lib"], &[("build", &["lib:build"])])),
        ])
        .unwrap();

        let sorted = graph.sorted_targets();
        let lib_pos = sorted
            .iter()
            .position(|t| *t == Target::new("lib", "build"))
            .unwrap();
        let app_pos = sorted
            .iter()
            .position(|t| *t == Target::new("app", "build"))
            .unwrap();
        assert!(lib_pos < app_pos);
    }

    #[test]
    fn test_target_waves_layer_by_depth() {
        let graph = build_graph(vec![
            ("lib", project_config(&[], &[("build", &[])])),
            ("app", project_config(&["lib"], &[("build", &["lib:build"])])),
            ("docs", project_config(&[], &[("lint", &[])])),
        ])
        .unwrap();

        let waves = graph.target_waves();
        assert_eq!(waves.len(), 2);
        assert!(waves[0].contains(&Target::new("lib", "build")));
        assert!(waves[0].contains(&Target::new("docs", "lint")));
        assert_eq!(waves[1], vec![Target::new("app", "build")]);
    }

    #[test]
    fn test_same_project_task_dep() {
        let graph = build_graph(vec![(
            "lib",
            project_config(&[], &[("build", &[]), ("test", &["build"])]),
        )])
        .unwrap();

        let test = graph.get_task(&Target::new("lib", "test")).unwrap();
        assert_eq!(test.deps, vec![Target::new("lib", "build")]);
    }

    #[test]
    fn test_unknown_project_dep_fails() {
        let result = build_graph(vec![(
            "app",
            project_config(&["ghost"], &[("build", &[])]),
        )]);
        assert!(matches!(
            result,
            Err(crate::error::GantryError::Config(ConfigError::UnknownProject(_)))
        ));
    }

    #[test]
    fn test_unknown_task_dep_fails() {
        let result = build_graph(vec![(
            "lib",
            project_config(&[], &[("test", &["build"])]),
        )]);
        assert!(matches!(
            result,
            Err(crate::error::GantryError::Config(ConfigError::UnknownTask { .. }))
        ));
    }

    #[test]
    fn test_task_cycle_reports_path() {
        let result = build_graph(vec![(
            "lib",
            project_config(&[], &[("a", &["b"]), ("b", &["a"])]),
        )]);

        match result {
            Err(crate::error::GantryError::Graph(GraphError::Cycle(path))) => {
                assert!(path.contains("lib:a"));
                assert!(path.contains("lib:b"));
                assert!(path.contains(" -> "));
            }
            other => panic!("expected cycle error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_dangling_edge_detected() {
        let deps = BTreeMap::from([
            ("a".to_string(), vec!["ghost".to_string()]),
            ("b".to_string(), vec![]),
        ]);

        match topological_sort(&deps) {
            Err(crate::error::GantryError::Graph(GraphError::DanglingEdge { from, to })) => {
                assert_eq!(from, "a");
                assert_eq!(to, "ghost");
            }
            other => panic!("expected dangling edge error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_project_cycle_fails() {
        let result = build_graph(vec![
            ("a", project_config(&["b"], &[])),
            ("b", project_config(&["a"], &[])),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_task_dependents() {
        let graph = build_graph(vec![
            ("lib", project_config(&[], &[("build", &[])])),
            ("app", project_config(&["lib"], &[("build", &["lib:build"])])),
        ])
        .unwrap();

        let dependents = graph.task_dependents(&Target::new("lib", "build"));
        assert_eq!(dependents, &[Target::new("app", "build")]);
    }

    #[test]
    fn test_export_project_graph() {
        let graph = build_graph(vec![
            ("lib", project_config(&[], &[])),
            ("app", project_config(&["lib"], &[])),
        ])
        .unwrap();

        let export = graph.export_project_graph();
        assert_eq!(export.nodes.len(), 2);
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].source, "app");
        assert_eq!(export.edges[0].target, "lib");

        let dot = export.to_dot("projects");
        assert!(dot.starts_with("digraph projects {"));
        assert!(dot.contains("\"app\" -> \"lib\";"));
    }
}
