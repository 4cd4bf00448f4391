//! Built-in toolchain providers

pub mod node;
pub mod system;

pub use node::NodeToolchain;
pub use system::SystemToolchain;
