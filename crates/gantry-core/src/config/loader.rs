//! Configuration loading

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::defaults::{config_file_names, project_config_file_names};
use super::types::{ProjectConfig, WorkspaceConfig};
use super::validation::validate_workspace_config;

/// Load workspace configuration from a file
pub fn load_workspace_config(path: &Path) -> Result<WorkspaceConfig> {
    let content = read_config(path)?;
    let config: WorkspaceConfig = parse_config(path, &content)?;
    validate_workspace_config(&config)?;
    debug!(path = %path.display(), "workspace config loaded and validated");
    Ok(config)
}

/// Load project configuration from a project source directory.
///
/// A missing file is not an error; projects without a config file simply
/// declare no tasks of their own.
pub fn load_project_config(project_dir: &Path) -> Result<ProjectConfig> {
    for name in project_config_file_names() {
        let path = project_dir.join(name);
        if path.exists() {
            let content = read_config(&path)?;
            let config: ProjectConfig = parse_config(&path, &content)?;
            debug!(path = %path.display(), "project config loaded");
            return Ok(config);
        }
    }

    debug!(dir = %project_dir.display(), "no project config file, using defaults");
    Ok(ProjectConfig::default())
}

/// Find the workspace configuration file in a directory or its parents
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    debug!(start_dir = %start_dir.display(), "searching for workspace config");
    let mut current = start_dir.to_path_buf();

    loop {
        for name in config_file_names() {
            let config_path = current.join(name);
            if config_path.exists() {
                info!(path = %config_path.display(), "found workspace config");
                return Some(config_path);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load the workspace config starting from a directory, falling back to
/// defaults when no file is found. Returns the config and, when a file was
/// used, the workspace root (the directory containing it).
pub fn load_config_or_default(start_dir: &Path) -> (WorkspaceConfig, Option<PathBuf>) {
    match find_config(start_dir) {
        Some(path) => match load_workspace_config(&path) {
            Ok(config) => {
                let root = path.parent().map(Path::to_path_buf);
                (config, root)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                (WorkspaceConfig::default(), None)
            }
        },
        None => {
            debug!("no workspace config found, using defaults");
            (WorkspaceConfig::default(), None)
        }
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(e).into())
}

fn parse_config<T: serde::de::DeserializeOwned>(path: &Path, content: &str) -> Result<T> {
    let is_toml = path.extension().is_some_and(|e| e == "toml");
    info!(path = %path.display(), format = if is_toml { "TOML" } else { "YAML" }, "loading config");

    let parsed = if is_toml {
        toml::from_str(content).map_err(ConfigError::TomlError)?
    } else {
        serde_yaml::from_str(content).map_err(ConfigError::YamlError)?
    };

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_workspace_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.toml");
        std::fs::write(
            &path,
            r#"
                name = "demo"

                [projects]
                lib = "packages/lib"
            "#,
        )
        .unwrap();

        let config = load_workspace_config(&path).unwrap();
        assert_eq!(config.name.as_deref(), Some("demo"));
        assert_eq!(config.projects.len(), 1);
    }

    #[test]
    fn test_find_config_walks_up() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("gantry.toml"), "name = \"root\"\n").unwrap();

        let nested = temp.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, temp.path().join("gantry.toml"));
    }

    #[test]
    fn test_find_config_missing() {
        let temp = TempDir::new().unwrap();
        assert!(find_config(temp.path()).is_none());
    }

    #[test]
    fn test_load_project_config_missing_is_default() {
        let temp = TempDir::new().unwrap();
        let config = load_project_config(temp.path()).unwrap();
        assert!(config.tasks.is_empty());
        assert!(config.dependencies.is_empty());
    }

    #[test]
    fn test_load_project_config_yaml() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("project.yml"),
            "dependencies: [lib]\ntasks:\n  build:\n    command: make\n",
        )
        .unwrap();

        let config = load_project_config(temp.path()).unwrap();
        assert_eq!(config.dependencies, vec!["lib"]);
        assert!(config.tasks.contains_key("build"));
    }

    #[test]
    fn test_load_config_or_default_returns_root() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("gantry.toml"),
            "[projects]\nlib = \"lib\"\n",
        )
        .unwrap();

        let (config, root) = load_config_or_default(temp.path());
        assert_eq!(config.projects.len(), 1);
        assert_eq!(root.unwrap(), temp.path());
    }
}
