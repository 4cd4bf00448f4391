//! Cache store facade combining local and remote backends
//!
//! The pipeline only talks to [`CacheStore`]. Remote failures are logged
//! and degrade to misses, never failing the surrounding run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gantry_core::config::{CacheConfig, WORKSPACE_DIRNAME};
use gantry_hash::{Fingerprint, HashManifest};
use tracing::{debug, warn};

use crate::error::Result;
use crate::local::{CacheStats, LocalCache, PruneStats};
use crate::remote::RemoteCache;

/// Environment variable overriding the effective cache mode
pub const CACHE_MODE_ENV: &str = "GANTRY_CACHE";

/// What the store is allowed to do for this run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Cache disabled entirely
    Off,
    /// Restore hits but never write new entries
    Read,
    /// Write new entries but never restore
    Write,
    /// Full read-write operation
    #[default]
    ReadWrite,
}

impl CacheMode {
    /// Resolve the mode from configuration plus the `GANTRY_CACHE`
    /// environment variable, which takes precedence. Unrecognized values
    /// are ignored with a warning.
    pub fn resolve(config_enabled: bool) -> Self {
        if let Ok(value) = std::env::var(CACHE_MODE_ENV) {
            match value.as_str() {
                "off" | "false" | "0" => return Self::Off,
                "read" => return Self::Read,
                "write" => return Self::Write,
                "read-write" | "on" | "true" | "1" => return Self::ReadWrite,
                other => {
                    warn!(value = other, "unrecognized {} value, ignoring", CACHE_MODE_ENV);
                }
            }
        }

        if config_enabled {
            Self::ReadWrite
        } else {
            Self::Off
        }
    }

    /// Whether hits may be restored
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether new entries may be written
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "read-write",
        };
        f.write_str(s)
    }
}

/// Combined local + optional remote cache
pub struct CacheStore {
    local: LocalCache,
    remote: Option<RemoteCache>,
    mode: CacheMode,
    max_age: Duration,
}

impl CacheStore {
    /// Build a store for the given workspace root from configuration
    pub fn new(workspace_root: &Path, config: &CacheConfig) -> Result<Self> {
        let dir = config
            .dir
            .as_ref()
            .map(|d| workspace_root.join(d))
            .unwrap_or_else(|| workspace_root.join(WORKSPACE_DIRNAME).join("cache"));

        let mode = CacheMode::resolve(config.enabled);

        let remote = match (&config.remote, mode) {
            (Some(remote_config), m) if m != CacheMode::Off => {
                match RemoteCache::from_config(remote_config) {
                    Ok(remote) => Some(remote),
                    Err(e) => {
                        warn!(error = %e, "remote cache unavailable, continuing with local only");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(dir = %dir.display(), %mode, remote = remote.is_some(), "cache store initialized");

        Ok(Self {
            local: LocalCache::new(dir),
            remote,
            mode,
            max_age: Duration::from_secs(config.max_age_days * 24 * 60 * 60),
        })
    }

    /// Effective cache mode for this run
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// The local backend
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// Directory holding hash manifests
    pub fn hashes_dir(&self) -> PathBuf {
        self.local.hashes_dir()
    }

    /// Persist the hash manifest for a computed fingerprint. Manifests are
    /// written whenever hashing runs so `gantry hash` can inspect them,
    /// even when output caching is skipped.
    pub fn record_manifest(&self, hash: &Fingerprint, manifest: &HashManifest) -> Result<()> {
        self.local.write_manifest(hash, manifest)
    }

    /// Try to restore a cache hit into the project directory. Returns
    /// `Ok(true)` only when outputs were actually restored; every failure
    /// path degrades to `Ok(false)`.
    pub async fn load(&self, hash: &Fingerprint, project_dir: &Path) -> Result<bool> {
        if !self.mode.is_readable() {
            return Ok(false);
        }

        if self.local.has(hash) {
            match self.local.restore_outputs(hash, project_dir) {
                Ok(()) => {
                    debug!(hash = %hash.short(), "local cache hit");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(hash = %hash.short(), error = %e, "failed to restore local cache entry");
                    return Ok(false);
                }
            }
        }

        if let Some(remote) = &self.remote {
            match remote.download(hash).await {
                Ok(Some(bytes)) => {
                    if let Err(e) = self
                        .local
                        .store_archive(hash, &bytes)
                        .and_then(|_| self.local.restore_outputs(hash, project_dir))
                    {
                        warn!(hash = %hash.short(), error = %e, "failed to restore remote cache entry");
                        return Ok(false);
                    }
                    debug!(hash = %hash.short(), "remote cache hit");
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(hash = %hash.short(), error = %e, "remote cache lookup failed");
                }
            }
        }

        Ok(false)
    }

    /// Store task outputs for a fingerprint. Local write failures propagate;
    /// remote upload is best-effort.
    pub async fn save(
        &self,
        hash: &Fingerprint,
        project_dir: &Path,
        outputs: &[String],
    ) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }

        self.local.write_outputs(hash, project_dir, outputs)?;

        if let Some(remote) = &self.remote {
            match remote.exists(hash).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => {
                    warn!(hash = %hash.short(), error = %e, "remote cache probe failed");
                    return Ok(());
                }
            }

            match self.local.read_archive(hash) {
                Ok(bytes) => {
                    if let Err(e) = remote.upload(hash, &bytes).await {
                        warn!(hash = %hash.short(), error = %e, "remote cache upload failed");
                    }
                }
                Err(e) => {
                    warn!(hash = %hash.short(), error = %e, "failed to read archive for upload");
                }
            }
        }

        Ok(())
    }

    /// Persist captured task output for later replay on cache hits
    pub fn save_logs(&self, hash: &Fingerprint, stdout: &str, stderr: &str) -> Result<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        self.local.write_logs(hash, stdout, stderr)
    }

    /// Captured task output for a hash, if recorded
    pub fn load_logs(&self, hash: &Fingerprint) -> Option<(String, String)> {
        if !self.mode.is_readable() {
            return None;
        }
        self.local.read_logs(hash).ok().flatten()
    }

    /// Remove entries older than the configured max age
    pub fn prune(&self) -> Result<PruneStats> {
        self.local.prune(self.max_age)
    }

    /// Counts and sizes of the local cache
    pub fn stats(&self) -> Result<CacheStats> {
        self.local.stats()
    }

    /// Delete the local cache entirely
    pub fn clear(&self) -> Result<()> {
        self.local.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            dir: None,
            max_age_days: 30,
            remote: None,
        }
    }

    fn manifest() -> HashManifest {
        HashManifest {
            target: "lib:build".to_string(),
            command: "make".to_string(),
            args: vec![],
            inputs: BTreeMap::new(),
            env: BTreeMap::new(),
            toolchains: vec![],
        }
    }

    #[test]
    fn test_mode_readable_writable() {
        assert!(CacheMode::ReadWrite.is_readable());
        assert!(CacheMode::ReadWrite.is_writable());
        assert!(CacheMode::Read.is_readable());
        assert!(!CacheMode::Read.is_writable());
        assert!(!CacheMode::Write.is_readable());
        assert!(CacheMode::Write.is_writable());
        assert!(!CacheMode::Off.is_readable());
        assert!(!CacheMode::Off.is_writable());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path(), &config()).unwrap();
        let project = temp.path().join("lib");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/out.txt"), "built").unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        store.record_manifest(&hash, &m).unwrap();
        store
            .save(&hash, &project, &["dist".to_string()])
            .await
            .unwrap();

        std::fs::remove_dir_all(project.join("dist")).unwrap();
        assert!(store.load(&hash, &project).await.unwrap());
        assert_eq!(
            std::fs::read_to_string(project.join("dist/out.txt")).unwrap(),
            "built"
        );
    }

    #[tokio::test]
    async fn test_load_miss_returns_false() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path(), &config()).unwrap();
        let project = temp.path().join("lib");
        std::fs::create_dir_all(&project).unwrap();

        let missed = store
            .load(&Fingerprint("deadbeef".to_string()), &project)
            .await
            .unwrap();
        assert!(!missed);
    }

    #[tokio::test]
    async fn test_disabled_mode_never_stores() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(
            temp.path(),
            &CacheConfig {
                enabled: false,
                ..config()
            },
        )
        .unwrap();
        let project = temp.path().join("lib");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/out.txt"), "built").unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        store
            .save(&hash, &project, &["dist".to_string()])
            .await
            .unwrap();
        assert!(!store.local().has(&hash));
        assert!(!store.load(&hash, &project).await.unwrap());
    }
}
