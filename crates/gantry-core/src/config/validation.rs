//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{ProjectConfig, WorkspaceConfig};

/// Validate workspace configuration
pub fn validate_workspace_config(config: &WorkspaceConfig) -> Result<()> {
    debug!("validating workspace configuration");

    for (id, path) in &config.projects {
        if id.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "projects".to_string(),
                message: "project ID cannot be empty".to_string(),
            }
            .into());
        }

        if id.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: format!("projects.{}", id),
                message: "project ID cannot contain ':'".to_string(),
            }
            .into());
        }

        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("projects.{}", id),
                message: "source path cannot be empty".to_string(),
            }
            .into());
        }
    }

    if let Some(concurrency) = config.runner.concurrency {
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.concurrency".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }
    }

    if let Some(remote) = &config.cache.remote {
        if remote.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cache.remote.url".to_string(),
                message: "url cannot be empty".to_string(),
            }
            .into());
        }
    }

    if config.affected.default_base.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "affected.default_base".to_string(),
            message: "base revision cannot be empty".to_string(),
        }
        .into());
    }

    debug!("workspace configuration validation passed");
    Ok(())
}

/// Validate a project configuration in the context of the workspace
pub fn validate_project_config(
    project_id: &str,
    config: &ProjectConfig,
    workspace: &WorkspaceConfig,
) -> Result<()> {
    for dep in &config.dependencies {
        if !workspace.projects.contains_key(dep) {
            return Err(ConfigError::UnknownProject(dep.clone()).into());
        }
    }

    for (task_name, task) in &config.tasks {
        if task_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.tasks", project_id),
                message: "task name cannot be empty".to_string(),
            }
            .into());
        }

        if let Some(timeout) = task.options.timeout_secs {
            if timeout == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}.tasks.{}.options.timeout_secs", project_id, task_name),
                    message: "timeout must be greater than zero".to_string(),
                }
                .into());
            }
        }

        // Cross-project task deps must reference declared projects; the
        // task itself is resolved later at graph build.
        for dep in &task.deps {
            if let Some((dep_project, _)) = dep.split_once(':') {
                if !dep_project.is_empty() && !workspace.projects.contains_key(dep_project) {
                    return Err(ConfigError::UnknownProject(dep_project.to_string()).into());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{RemoteCacheConfig, TaskConfig, TaskOptionsConfig};
    use std::collections::BTreeMap;

    fn workspace_with_projects(ids: &[&str]) -> WorkspaceConfig {
        let mut config = WorkspaceConfig::default();
        for id in ids {
            config.projects.insert(id.to_string(), id.into());
        }
        config
    }

    #[test]
    fn test_valid_workspace() {
        let config = workspace_with_projects(&["lib", "app"]);
        assert!(validate_workspace_config(&config).is_ok());
    }

    #[test]
    fn test_project_id_with_colon_rejected() {
        let config = workspace_with_projects(&["lib:extra"]);
        assert!(validate_workspace_config(&config).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = workspace_with_projects(&["lib"]);
        config.runner.concurrency = Some(0);
        assert!(validate_workspace_config(&config).is_err());
    }

    #[test]
    fn test_empty_remote_url_rejected() {
        let mut config = workspace_with_projects(&["lib"]);
        config.cache.remote = Some(RemoteCacheConfig {
            url: String::new(),
            compression: Default::default(),
        });
        assert!(validate_workspace_config(&config).is_err());
    }

    #[test]
    fn test_unknown_project_dependency_rejected() {
        let workspace = workspace_with_projects(&["lib"]);
        let project = ProjectConfig {
            dependencies: vec!["missing".to_string()],
            ..Default::default()
        };
        assert!(validate_project_config("lib", &project, &workspace).is_err());
    }

    #[test]
    fn test_unknown_cross_project_task_dep_rejected() {
        let workspace = workspace_with_projects(&["lib"]);
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "build".to_string(),
            TaskConfig {
                deps: vec!["ghost:build".to_string()],
                ..Default::default()
            },
        );
        let project = ProjectConfig {
            tasks,
            ..Default::default()
        };
        assert!(validate_project_config("lib", &project, &workspace).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let workspace = workspace_with_projects(&["lib"]);
        let mut tasks = BTreeMap::new();
        tasks.insert(
            "build".to_string(),
            TaskConfig {
                options: TaskOptionsConfig {
                    timeout_secs: Some(0),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let project = ProjectConfig {
            tasks,
            ..Default::default()
        };
        assert!(validate_project_config("lib", &project, &workspace).is_err());
    }
}
