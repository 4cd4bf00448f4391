//! Gantry Pipeline - Action graph and execution
//!
//! Expands requested targets into a deduplicated action graph
//! (setup-toolchain -> install-deps -> sync-project -> run-task) and
//! executes it on a bounded worker pool with caching, retries, abort
//! propagation, cancellation, and per-action timeouts.

pub mod action;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod report;
pub mod reporter;

pub use action::{Action, ActionNode, ActionStatus, Attempt};
pub use error::{ExecutionError, PipelineError, Result};
pub use graph::ActionGraph;
pub use pipeline::{CancelHandle, Pipeline, PipelineOptions};
pub use report::{ActionReport, RunReport, RunSummary};
pub use reporter::{ActionEvent, CollectingReporter, Reporter, TracingReporter};
