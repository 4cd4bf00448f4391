//! Gantry Cache - Content-addressed output caching
//!
//! Stores task outputs as tar.gz archives keyed by invocation fingerprint,
//! with hash manifests alongside for inspection. An optional remote HTTP
//! content-addressed store extends hits across machines; remote failures
//! always degrade to cache misses.

pub mod archive;
pub mod error;
pub mod local;
pub mod remote;
pub mod store;

pub use error::{CacheError, Result};
pub use local::{CacheStats, LocalCache, PruneStats};
pub use remote::RemoteCache;
pub use store::{CacheMode, CacheStore, CACHE_MODE_ENV};
