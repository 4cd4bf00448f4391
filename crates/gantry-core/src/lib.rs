//! Gantry Core - Core library for the Gantry task runner
//!
//! This crate provides the foundational types, error handling,
//! configuration, and workspace graph model for the Gantry task runner.

pub mod config;
pub mod error;
pub mod workspace;

pub use error::{ConfigError, GantryError, GraphError, Result, TargetError, VcsError};
pub use workspace::{
    AffectedReason, AffectedResolver, AffectedSet, GraphExport, Project, Target, TargetExpr, Task,
    WorkspaceGraph,
};
