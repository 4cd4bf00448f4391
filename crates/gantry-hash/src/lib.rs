//! Gantry Hash - Content hashing for task invocations
//!
//! Computes deterministic fingerprints from a task's command, arguments,
//! input file contents, declared environment inputs, and resolved
//! toolchain versions, and keeps the derivation queryable as a manifest.

pub mod error;
pub mod hasher;
pub mod manifest;

pub use error::{HashError, Result};
pub use hasher::ContentHasher;
pub use manifest::{find_manifest, Fingerprint, HashManifest};
