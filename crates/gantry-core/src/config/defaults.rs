//! Default configuration values

/// Default workspace configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "gantry.toml";

/// Default workspace configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "gantry.yml";

/// Per-project configuration file name (TOML)
pub const PROJECT_CONFIG_TOML: &str = "project.toml";

/// Per-project configuration file name (YAML)
pub const PROJECT_CONFIG_YAML: &str = "project.yml";

/// Directory for workspace-local state (cache, reports)
pub const WORKSPACE_DIRNAME: &str = ".gantry";

/// Get list of workspace config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".gantry.toml",
        ".gantry.yml",
    ]
}

/// Get list of project config file names to search for
pub fn project_config_file_names() -> Vec<&'static str> {
    vec![PROJECT_CONFIG_TOML, PROJECT_CONFIG_YAML]
}

/// Default workspace configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Gantry workspace configuration
# See https://github.com/example/gantry for documentation

[projects]
# lib = "packages/lib"
# app = "packages/app"

[runner]
bail = false
retry_count = 0

[cache]
enabled = true
max_age_days = 30

[affected]
default_base = "main"
"#;
