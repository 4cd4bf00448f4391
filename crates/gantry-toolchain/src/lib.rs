//! Gantry Toolchain - Tool version resolution and installation
//!
//! Projects declare requirements like `node@20`; providers resolve them to
//! concrete versions, install them under the user tools directory, and
//! contribute PATH entries and environment variables to task processes.

pub mod error;
pub mod provider;
pub mod providers;
pub mod registry;

pub use error::{Result, ToolchainError};
pub use provider::{ResolvedToolchain, ToolchainProvider, ToolchainSpec};
pub use providers::{NodeToolchain, SystemToolchain};
pub use registry::{default_tools_dir, ToolchainRegistry};
