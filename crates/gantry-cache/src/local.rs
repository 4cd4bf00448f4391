//! Local on-disk cache under `.gantry/cache`
//!
//! Layout:
//!   .gantry/cache/hashes/<hash>.json   hash manifests
//!   .gantry/cache/out/<hash>.tar.gz    archived task outputs

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use gantry_hash::{Fingerprint, HashManifest};
use tracing::{debug, warn};

use crate::archive;
use crate::error::Result;

/// Statistics about the cache contents
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of hash manifests
    pub manifest_count: usize,
    /// Number of output archives
    pub archive_count: usize,
    /// Total size of all entries in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Human-readable total size
    pub fn formatted_size(&self) -> String {
        let size = self.total_size as f64;
        if size >= 1024.0 * 1024.0 * 1024.0 {
            format!("{:.2} GiB", size / (1024.0 * 1024.0 * 1024.0))
        } else if size >= 1024.0 * 1024.0 {
            format!("{:.2} MiB", size / (1024.0 * 1024.0))
        } else if size >= 1024.0 {
            format!("{:.2} KiB", size / 1024.0)
        } else {
            format!("{} B", self.total_size)
        }
    }
}

/// Result of a prune pass
#[derive(Debug, Clone, Default)]
pub struct PruneStats {
    /// Entries removed
    pub removed: usize,
    /// Bytes reclaimed
    pub reclaimed_bytes: u64,
}

/// File-backed cache rooted in the workspace state directory
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// Create a cache rooted at the given directory, typically
    /// `<workspace>/.gantry/cache`. Directories are created lazily on write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Root directory of the cache
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding hash manifests
    pub fn hashes_dir(&self) -> PathBuf {
        self.dir.join("hashes")
    }

    /// Directory holding output archives
    pub fn outputs_dir(&self) -> PathBuf {
        self.dir.join("out")
    }

    /// Directory holding captured task output logs
    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    fn manifest_path(&self, hash: &Fingerprint) -> PathBuf {
        self.hashes_dir().join(format!("{}.json", hash))
    }

    fn archive_path(&self, hash: &Fingerprint) -> PathBuf {
        self.outputs_dir().join(format!("{}.tar.gz", hash))
    }

    /// Whether an output archive exists for the given hash
    pub fn has(&self, hash: &Fingerprint) -> bool {
        self.archive_path(hash).exists()
    }

    /// Persist a hash manifest
    pub fn write_manifest(&self, hash: &Fingerprint, manifest: &HashManifest) -> Result<()> {
        std::fs::create_dir_all(self.hashes_dir())?;
        let path = self.manifest_path(hash);
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&path, content)?;
        debug!(hash = %hash.short(), "wrote hash manifest");
        Ok(())
    }

    /// Archive the given output paths from the project directory
    pub fn write_outputs(
        &self,
        hash: &Fingerprint,
        project_dir: &Path,
        outputs: &[String],
    ) -> Result<()> {
        std::fs::create_dir_all(self.outputs_dir())?;
        archive::create_archive(project_dir, outputs, &self.archive_path(hash))?;
        debug!(hash = %hash.short(), "archived task outputs");
        Ok(())
    }

    /// Restore archived outputs into the project directory. Touches the
    /// entry's modification time so recently hit entries survive pruning.
    pub fn restore_outputs(&self, hash: &Fingerprint, project_dir: &Path) -> Result<()> {
        let path = self.archive_path(hash);
        archive::restore_archive(&path, project_dir)?;
        touch(&path);
        touch(&self.manifest_path(hash));
        Ok(())
    }

    /// Persist captured stdout/stderr so cache hits can replay them
    pub fn write_logs(&self, hash: &Fingerprint, stdout: &str, stderr: &str) -> Result<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::write(self.logs_dir().join(format!("{}.stdout.log", hash)), stdout)?;
        std::fs::write(self.logs_dir().join(format!("{}.stderr.log", hash)), stderr)?;
        Ok(())
    }

    /// Read captured logs for a hash, if any were recorded
    pub fn read_logs(&self, hash: &Fingerprint) -> Result<Option<(String, String)>> {
        let stdout_path = self.logs_dir().join(format!("{}.stdout.log", hash));
        if !stdout_path.exists() {
            return Ok(None);
        }

        let stdout = std::fs::read_to_string(&stdout_path)?;
        let stderr = std::fs::read_to_string(self.logs_dir().join(format!("{}.stderr.log", hash)))
            .unwrap_or_default();
        Ok(Some((stdout, stderr)))
    }

    /// Read raw archive bytes (for remote upload)
    pub fn read_archive(&self, hash: &Fingerprint) -> Result<Vec<u8>> {
        archive::read_archive_bytes(&self.archive_path(hash))
    }

    /// Write raw archive bytes (from a remote download)
    pub fn store_archive(&self, hash: &Fingerprint, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(self.outputs_dir())?;
        std::fs::write(self.archive_path(hash), bytes)?;
        Ok(())
    }

    /// Gather counts and sizes across both cache directories
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();

        for entry in read_dir_entries(&self.hashes_dir())? {
            stats.manifest_count += 1;
            stats.total_size += entry_size(&entry);
        }
        for entry in read_dir_entries(&self.outputs_dir())? {
            stats.archive_count += 1;
            stats.total_size += entry_size(&entry);
        }

        Ok(stats)
    }

    /// Remove entries whose modification time is older than `max_age`.
    /// A manifest and its archive are pruned together.
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut stats = PruneStats::default();

        for entry in read_dir_entries(&self.outputs_dir())? {
            let path = entry.path();
            if !is_older_than(&path, cutoff) {
                continue;
            }

            stats.reclaimed_bytes += entry_size(&entry);
            std::fs::remove_file(&path)?;
            stats.removed += 1;

            if let Some(stem) = path.file_name().and_then(|n| n.to_str()) {
                if let Some(hash) = stem.strip_suffix(".tar.gz") {
                    let manifest = self.hashes_dir().join(format!("{}.json", hash));
                    if manifest.exists() {
                        stats.reclaimed_bytes +=
                            manifest.metadata().map(|m| m.len()).unwrap_or(0);
                        std::fs::remove_file(&manifest)?;
                    }
                }
            }
        }

        // Orphaned manifests and logs age out on the same schedule
        for dir in [self.hashes_dir(), self.logs_dir()] {
            for entry in read_dir_entries(&dir)? {
                let path = entry.path();
                if is_older_than(&path, cutoff) {
                    stats.reclaimed_bytes += entry_size(&entry);
                    std::fs::remove_file(&path)?;
                    stats.removed += 1;
                }
            }
        }

        debug!(
            removed = stats.removed,
            reclaimed = stats.reclaimed_bytes,
            "pruned cache entries"
        );
        Ok(stats)
    }

    /// Delete the entire cache directory
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

fn read_dir_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn entry_size(entry: &std::fs::DirEntry) -> u64 {
    entry.metadata().map(|m| m.len()).unwrap_or(0)
}

fn is_older_than(path: &Path, cutoff: SystemTime) -> bool {
    path.metadata()
        .and_then(|m| m.modified())
        .map(|mtime| mtime < cutoff)
        .unwrap_or(false)
}

fn touch(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Ok(file) = File::options().write(true).open(path) {
        if let Err(e) = file.set_modified(SystemTime::now()) {
            warn!(path = %path.display(), error = %e, "failed to touch cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

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
    fn test_write_and_restore_outputs() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        let project = temp.path().join("lib");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/out.txt"), "built").unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        cache.write_manifest(&hash, &m).unwrap();
        cache
            .write_outputs(&hash, &project, &["dist".to_string()])
            .unwrap();
        assert!(cache.has(&hash));

        std::fs::remove_dir_all(project.join("dist")).unwrap();
        cache.restore_outputs(&hash, &project).unwrap();
        assert_eq!(
            std::fs::read_to_string(project.join("dist/out.txt")).unwrap(),
            "built"
        );
    }

    #[test]
    fn test_logs_roundtrip_both_streams() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        let hash = manifest().fingerprint();

        cache.write_logs(&hash, "built ok\n", "warning: deprecated\n").unwrap();

        let (stdout, stderr) = cache.read_logs(&hash).unwrap().unwrap();
        assert_eq!(stdout, "built ok\n");
        assert_eq!(stderr, "warning: deprecated\n");
    }

    #[test]
    fn test_has_false_for_missing_entry() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        assert!(!cache.has(&Fingerprint("deadbeef".to_string())));
    }

    #[test]
    fn test_stats_counts_entries() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        let project = temp.path().join("lib");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/out.txt"), "built").unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        cache.write_manifest(&hash, &m).unwrap();
        cache
            .write_outputs(&hash, &project, &["dist".to_string()])
            .unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.manifest_count, 1);
        assert_eq!(stats.archive_count, 1);
        assert!(stats.total_size > 0);
    }

    #[test]
    fn test_prune_removes_old_entries() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        let project = temp.path().join("lib");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/out.txt"), "built").unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        cache.write_manifest(&hash, &m).unwrap();
        cache
            .write_outputs(&hash, &project, &["dist".to_string()])
            .unwrap();

        // Zero max age makes everything written before "now" stale
        let old = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(cache.outputs_dir().join(format!("{}.tar.gz", hash)))
            .unwrap()
            .set_modified(old)
            .unwrap();
        File::options()
            .write(true)
            .open(cache.hashes_dir().join(format!("{}.json", hash)))
            .unwrap()
            .set_modified(old)
            .unwrap();

        let stats = cache.prune(Duration::from_secs(60)).unwrap();
        assert!(stats.removed >= 1);
        assert!(!cache.has(&hash));
        assert!(!cache.hashes_dir().join(format!("{}.json", hash)).exists());
    }

    #[test]
    fn test_prune_keeps_fresh_entries() {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::new(temp.path().join("cache"));
        let project = temp.path().join("lib");
        std::fs::create_dir_all(&project).unwrap();

        let m = manifest();
        let hash = m.fingerprint();
        cache.write_manifest(&hash, &m).unwrap();
        cache.write_outputs(&hash, &project, &[]).unwrap();

        let stats = cache.prune(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.removed, 0);
        assert!(cache.has(&hash));
    }

    #[test]
    fn test_formatted_size() {
        let stats = CacheStats {
            total_size: 2048,
            ..Default::default()
        };
        assert_eq!(stats.formatted_size(), "2.00 KiB");

        let stats = CacheStats {
            total_size: 512,
            ..Default::default()
        };
        assert_eq!(stats.formatted_size(), "512 B");
    }
}
