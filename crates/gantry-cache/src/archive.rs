//! Output archives — tar.gz packing and restoring of task outputs

use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use globset::{Glob, GlobSetBuilder};
use tar::{Archive, Builder, EntryType};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CacheError, Result};

/// Characters that make an output pattern a glob instead of a literal path
fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Pack the given output paths/globs (relative to `project_dir`) into a
/// tar.gz archive at `dest`. Paths inside the archive stay relative to the
/// project directory so they restore in place.
pub fn create_archive(project_dir: &Path, outputs: &[String], dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut glob_builder = GlobSetBuilder::new();
    let mut has_globs = false;

    for output in outputs {
        if is_glob(output) {
            let glob = Glob::new(output).map_err(|e| CacheError::Archive(e.to_string()))?;
            glob_builder.add(glob);
            has_globs = true;
            continue;
        }

        let path = project_dir.join(output);
        if path.is_dir() {
            builder
                .append_dir_all(output, &path)
                .map_err(|e| CacheError::Archive(e.to_string()))?;
        } else if path.exists() {
            builder
                .append_path_with_name(&path, output)
                .map_err(|e| CacheError::Archive(e.to_string()))?;
        } else {
            debug!(output, "declared output missing, skipping from archive");
        }
    }

    if has_globs {
        let globset = glob_builder
            .build()
            .map_err(|e| CacheError::Archive(e.to_string()))?;

        for entry in WalkDir::new(project_dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() && !entry.file_type().is_symlink() {
                continue;
            }

            let relative = entry.path().strip_prefix(project_dir).unwrap_or(entry.path());
            let relative_str = relative.to_string_lossy().replace('\\', "/");

            if globset.is_match(&relative_str) {
                builder
                    .append_path_with_name(entry.path(), &relative_str)
                    .map_err(|e| CacheError::Archive(e.to_string()))?;
            }
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| CacheError::Archive(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Archive(e.to_string()))?;

    debug!(dest = %dest.display(), "created output archive");
    Ok(())
}

/// Restore an archive into the project directory. Symlink entries are
/// restored as symlinks where the platform allows it; otherwise the link
/// target's contents are copied instead so the restore never fails on
/// platforms without unprivileged symlink support.
pub fn restore_archive(archive_path: &Path, project_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    for entry in archive
        .entries()
        .map_err(|e| CacheError::Archive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| CacheError::Archive(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| CacheError::Archive(e.to_string()))?
            .into_owned();
        let dest = project_dir.join(&entry_path);

        if entry.header().entry_type() == EntryType::Symlink {
            let link_target = entry
                .link_name()
                .map_err(|e| CacheError::Archive(e.to_string()))?
                .map(|p| p.into_owned());

            if let Some(link_target) = link_target {
                restore_symlink(project_dir, &dest, &link_target)?;
                continue;
            }
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&dest)
            .map_err(|e| CacheError::Archive(e.to_string()))?;
    }

    debug!(archive = %archive_path.display(), "restored output archive");
    Ok(())
}

/// Restore a symlink entry, falling back to copying file contents when
/// symlink creation is not possible.
fn restore_symlink(project_dir: &Path, dest: &Path, link_target: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if dest.exists() {
        std::fs::remove_file(dest)?;
    }

    match make_symlink(link_target, dest) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(
                dest = %dest.display(),
                error = %e,
                "symlink restore failed, copying contents instead"
            );

            // Resolve the link target relative to the symlink's directory,
            // then relative to the project root.
            let resolved = dest
                .parent()
                .map(|p| p.join(link_target))
                .filter(|p| p.exists())
                .unwrap_or_else(|| project_dir.join(link_target));

            if resolved.is_file() {
                std::fs::copy(&resolved, dest)?;
            }
            Ok(())
        }
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(windows)]
fn make_symlink(target: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, dest)
}

/// Read an archive fully into memory (for remote upload)
pub fn read_archive_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_archive_roundtrip_literal_dir() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/app.js"), "console.log(1)").unwrap();

        let archive = temp.path().join("out.tar.gz");
        create_archive(&project, &["dist".to_string()], &archive).unwrap();

        let restore_dir = temp.path().join("restore");
        std::fs::create_dir_all(&restore_dir).unwrap();
        restore_archive(&archive, &restore_dir).unwrap();

        let restored = std::fs::read_to_string(restore_dir.join("dist/app.js")).unwrap();
        assert_eq!(restored, "console.log(1)");
    }

    #[test]
    fn test_archive_glob_outputs() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(project.join("build")).unwrap();
        std::fs::write(project.join("build/a.o"), "a").unwrap();
        std::fs::write(project.join("build/b.txt"), "b").unwrap();

        let archive = temp.path().join("out.tar.gz");
        create_archive(&project, &["build/*.o".to_string()], &archive).unwrap();

        let restore_dir = temp.path().join("restore");
        std::fs::create_dir_all(&restore_dir).unwrap();
        restore_archive(&archive, &restore_dir).unwrap();

        assert!(restore_dir.join("build/a.o").exists());
        assert!(!restore_dir.join("build/b.txt").exists());
    }

    #[test]
    fn test_missing_output_skipped() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();

        let archive = temp.path().join("out.tar.gz");
        create_archive(&project, &["dist".to_string()], &archive).unwrap();
        assert!(archive.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_roundtrip() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(project.join("dist")).unwrap();
        std::fs::write(project.join("dist/real.js"), "real").unwrap();
        std::os::unix::fs::symlink("real.js", project.join("dist/link.js")).unwrap();

        let archive = temp.path().join("out.tar.gz");
        create_archive(&project, &["dist".to_string()], &archive).unwrap();

        let restore_dir = temp.path().join("restore");
        std::fs::create_dir_all(&restore_dir).unwrap();
        restore_archive(&archive, &restore_dir).unwrap();

        let link = restore_dir.join("dist/link.js");
        assert!(link.exists());
        assert_eq!(std::fs::read_to_string(link).unwrap(), "real");
    }
}
