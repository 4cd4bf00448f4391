//! Action graph — expansion of targets into a deduplicated action DAG
//!
//! Each requested target expands into the chain
//! setup-toolchain -> install-deps -> sync-project -> run-task, with
//! run-task edges mirroring the task dependency graph. Equivalent actions
//! are deduplicated, so a toolchain is set up once no matter how many
//! projects share it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use gantry_core::workspace::{topological_sort, GraphEdge, GraphNode};
use gantry_core::{GraphExport, Target, WorkspaceGraph};
use tracing::{debug, instrument};

use crate::action::ActionNode;
use crate::error::Result;

const SYSTEM_TOOLCHAIN: &str = "system";

/// A deduplicated DAG of actions, edges pointing dependency -> dependent
#[derive(Debug, Clone)]
pub struct ActionGraph {
    nodes: Vec<ActionNode>,
    /// Dependency indices per node
    dependencies: Vec<Vec<usize>>,
    /// Dependent indices per node
    dependents: Vec<Vec<usize>>,
}

impl ActionGraph {
    /// Expand the given targets (and their transitive task dependencies)
    /// into an action graph.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub fn build(workspace: &WorkspaceGraph, targets: &[Target]) -> Result<Self> {
        let mut builder = Builder::default();

        // Transitive closure over task dependencies, breadth-first
        let mut queue: VecDeque<Target> = targets.iter().cloned().collect();
        let mut included: BTreeSet<Target> = BTreeSet::new();

        while let Some(target) = queue.pop_front() {
            if !included.insert(target.clone()) {
                continue;
            }
            let task = workspace.get_task(&target)?;
            for dep in &task.deps {
                queue.push_back(dep.clone());
            }
        }

        for target in &included {
            let project = workspace.project(&target.project)?;
            let toolchain = project
                .toolchain
                .clone()
                .unwrap_or_else(|| SYSTEM_TOOLCHAIN.to_string());

            let setup = builder.add(ActionNode::SetupToolchain { spec: toolchain });
            let install = builder.add(ActionNode::InstallDeps {
                project: project.id.clone(),
            });
            let sync = builder.add(ActionNode::SyncProject {
                project: project.id.clone(),
            });
            let run = builder.add(ActionNode::RunTask {
                target: target.clone(),
            });

            builder.edge(setup, install);
            builder.edge(install, sync);
            builder.edge(sync, run);

            let task = workspace.get_task(target)?;
            for dep in &task.deps {
                let dep_run = builder.add(ActionNode::RunTask {
                    target: dep.clone(),
                });
                builder.edge(dep_run, run);
            }
        }

        let graph = builder.finish();
        graph.check_acyclic()?;

        debug!(
            actions = graph.len(),
            edges = graph.dependencies.iter().map(Vec::len).sum::<usize>(),
            "action graph built"
        );
        Ok(graph)
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no actions
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All action nodes, indexable by action index
    pub fn nodes(&self) -> &[ActionNode] {
        &self.nodes
    }

    /// Dependency indices of an action
    pub fn dependencies_of(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Dependent indices of an action
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// All indices transitively downstream of an action
    pub fn transitive_dependents_of(&self, index: usize) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependents[index].iter().copied().collect();
        let mut result = Vec::new();

        while let Some(idx) = queue.pop_front() {
            if !seen.insert(idx) {
                continue;
            }
            result.push(idx);
            queue.extend(self.dependents[idx].iter().copied());
        }

        result
    }

    /// Action indices in topological order (dependencies first)
    pub fn sorted_indices(&self) -> Result<Vec<usize>> {
        let by_id: HashMap<String, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();

        let deps: BTreeMap<String, Vec<String>> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                (
                    n.id(),
                    self.dependencies[i]
                        .iter()
                        .map(|d| self.nodes[*d].id())
                        .collect(),
                )
            })
            .collect();

        let sorted = topological_sort(&deps)?;
        Ok(sorted.into_iter().map(|id| by_id[&id]).collect())
    }

    /// Group actions into waves: every action in a wave depends only on
    /// actions in earlier waves, so a wave could run fully in parallel.
    pub fn batches(&self) -> Result<Vec<Vec<usize>>> {
        let sorted = self.sorted_indices()?;
        let mut depth = vec![0usize; self.nodes.len()];

        for index in &sorted {
            for dep in &self.dependencies[*index] {
                depth[*index] = depth[*index].max(depth[*dep] + 1);
            }
        }

        let max_depth = depth.iter().copied().max().unwrap_or(0);
        let mut batches = vec![Vec::new(); max_depth + 1];
        for index in sorted {
            batches[depth[index]].push(index);
        }
        if self.nodes.is_empty() {
            batches.clear();
        }
        Ok(batches)
    }

    /// Export nodes and edges for visualization
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .nodes
            .iter()
            .map(|n| GraphNode {
                id: n.id(),
                label: n.label(),
            })
            .collect();

        let mut edges = Vec::new();
        for (index, deps) in self.dependencies.iter().enumerate() {
            for dep in deps {
                let source = self.nodes[*dep].id();
                let target = self.nodes[index].id();
                edges.push(GraphEdge {
                    id: format!("{} -> {}", source, target),
                    source,
                    target,
                });
            }
        }

        GraphExport { nodes, edges }
    }

    fn check_acyclic(&self) -> Result<()> {
        self.sorted_indices().map(|_| ())
    }
}

#[derive(Default)]
struct Builder {
    nodes: Vec<ActionNode>,
    by_node: HashMap<ActionNode, usize>,
    edges: HashSet<(usize, usize)>,
}

impl Builder {
    /// Add a node, returning the existing index for duplicates
    fn add(&mut self, node: ActionNode) -> usize {
        if let Some(index) = self.by_node.get(&node) {
            return *index;
        }
        let index = self.nodes.len();
        self.by_node.insert(node.clone(), index);
        self.nodes.push(node);
        index
    }

    /// Add a dependency edge from `dep` to `dependent`
    fn edge(&mut self, dep: usize, dependent: usize) {
        if dep != dependent {
            self.edges.insert((dep, dependent));
        }
    }

    fn finish(self) -> ActionGraph {
        let mut dependencies = vec![Vec::new(); self.nodes.len()];
        let mut dependents = vec![Vec::new(); self.nodes.len()];

        let mut edges: Vec<(usize, usize)> = self.edges.into_iter().collect();
        edges.sort_unstable();
        for (dep, dependent) in edges {
            dependencies[dependent].push(dep);
            dependents[dep].push(dependent);
        }

        ActionGraph {
            nodes: self.nodes,
            dependencies,
            dependents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::config::{ProjectConfig, TaskConfig, WorkspaceConfig};
    use std::collections::BTreeMap;

    fn workspace() -> WorkspaceGraph {
        let mut config = WorkspaceConfig::default();
        config.projects.insert("lib".to_string(), "lib".into());
        config.projects.insert("app".to_string(), "app".into());

        let mut lib = ProjectConfig {
            toolchain: Some("node@20".to_string()),
            ..Default::default()
        };
        lib.tasks.insert(
            "build".to_string(),
            TaskConfig {
                command: Some("make build".to_string()),
                ..Default::default()
            },
        );

        let mut app = ProjectConfig {
            dependencies: vec!["lib".to_string()],
            toolchain: Some("node@20".to_string()),
            ..Default::default()
        };
        app.tasks.insert(
            "build".to_string(),
            TaskConfig {
                command: Some("make build".to_string()),
                deps: vec!["lib:build".to_string()],
                ..Default::default()
            },
        );

        let configs = BTreeMap::from([("lib".to_string(), lib), ("app".to_string(), app)]);
        WorkspaceGraph::build("/tmp/ws".into(), &config, configs).unwrap()
    }

    fn find(graph: &ActionGraph, id: &str) -> usize {
        graph
            .nodes()
            .iter()
            .position(|n| n.id() == id)
            .unwrap_or_else(|| panic!("missing action {}", id))
    }

    #[test]
    fn test_expansion_includes_transitive_deps() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("app", "build")]).unwrap();

        // lib:build is pulled in through app:build's dependency
        find(&graph, "run-task(lib:build)");
        find(&graph, "run-task(app:build)");
        find(&graph, "sync-project(lib)");
        find(&graph, "install-deps(app)");
    }

    #[test]
    fn test_shared_toolchain_deduplicated() {
        let ws = workspace();
        let graph =
            ActionGraph::build(&ws, &[Target::new("app", "build"), Target::new("lib", "build")])
                .unwrap();

        let setups = graph
            .nodes()
            .iter()
            .filter(|n| matches!(n, ActionNode::SetupToolchain { .. }))
            .count();
        assert_eq!(setups, 1);
    }

    #[test]
    fn test_edges_follow_expansion_chain() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("app", "build")]).unwrap();

        let setup = find(&graph, "setup-toolchain(node@20)");
        let install = find(&graph, "install-deps(app)");
        let sync = find(&graph, "sync-project(app)");
        let run = find(&graph, "run-task(app:build)");
        let dep_run = find(&graph, "run-task(lib:build)");

        assert!(graph.dependencies_of(install).contains(&setup));
        assert!(graph.dependencies_of(sync).contains(&install));
        assert!(graph.dependencies_of(run).contains(&sync));
        assert!(graph.dependencies_of(run).contains(&dep_run));
    }

    #[test]
    fn test_topological_order_respects_edges() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("app", "build")]).unwrap();
        let sorted = graph.sorted_indices().unwrap();

        let position = |id: &str| {
            let index = find(&graph, id);
            sorted.iter().position(|i| *i == index).unwrap()
        };

        assert!(position("setup-toolchain(node@20)") < position("install-deps(app)"));
        assert!(position("install-deps(app)") < position("sync-project(app)"));
        assert!(position("sync-project(app)") < position("run-task(app:build)"));
        assert!(position("run-task(lib:build)") < position("run-task(app:build)"));
    }

    #[test]
    fn test_batches_are_dependency_layered() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("app", "build")]).unwrap();
        let batches = graph.batches().unwrap();

        let mut seen = HashSet::new();
        for batch in &batches {
            for index in batch {
                for dep in graph.dependencies_of(*index) {
                    assert!(seen.contains(dep), "dependency scheduled after dependent");
                }
            }
            seen.extend(batch.iter().copied());
        }
        assert_eq!(seen.len(), graph.len());
    }

    #[test]
    fn test_transitive_dependents() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("app", "build")]).unwrap();

        let setup = find(&graph, "setup-toolchain(node@20)");
        let downstream = graph.transitive_dependents_of(setup);

        // Everything hangs off the shared toolchain setup
        assert_eq!(downstream.len(), graph.len() - 1);
    }

    #[test]
    fn test_export_contains_all_nodes() {
        let ws = workspace();
        let graph = ActionGraph::build(&ws, &[Target::new("lib", "build")]).unwrap();

        let export = graph.export();
        assert_eq!(export.nodes.len(), graph.len());
        assert!(!export.edges.is_empty());

        let dot = export.to_dot("actions");
        assert!(dot.contains("run-task(lib:build)"));
    }
}
