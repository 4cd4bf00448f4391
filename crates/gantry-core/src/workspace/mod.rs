//! Workspace model — projects, tasks, graphs, affected detection

pub mod affected;
pub mod graph;
pub mod project;
pub mod target;

pub use affected::{touched_files_from_git, AffectedReason, AffectedResolver, AffectedSet};
pub use graph::{topological_sort, GraphEdge, GraphExport, GraphNode, WorkspaceGraph};
pub use project::{Project, Task, TaskOptions};
pub use target::{expand_targets, Target, TargetExpr};
