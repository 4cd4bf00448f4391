//! Target addressing — `<project>:<task>` references with glob expansion

use std::fmt;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};

/// Address of a task within a project
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    /// Project ID
    pub project: String,
    /// Task name
    pub task: String,
}

impl Target {
    /// Create a new target
    pub fn new(project: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            task: task.into(),
        }
    }

    /// Parse a concrete target from `project:task` format
    pub fn parse(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((project, task)) if !project.is_empty() && !task.is_empty() => {
                Ok(Self::new(project, task))
            }
            _ => Err(TargetError::InvalidFormat(s.to_string()).into()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project, self.task)
    }
}

/// A target expression from the command line: a concrete target, a glob
/// over projects and/or tasks, or an exclusion (`!` prefix). An empty
/// project part (`:build`) addresses the task in every project.
#[derive(Debug, Clone)]
pub struct TargetExpr {
    /// Glob over project IDs; empty matches every project
    project_pattern: String,
    /// Glob over task names
    task_pattern: String,
    /// Whether this expression excludes instead of includes
    pub negated: bool,
}

impl TargetExpr {
    /// Parse a target expression
    pub fn parse(s: &str) -> Result<Self> {
        let (negated, body) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (project_pattern, task_pattern) = match body.split_once(':') {
            Some((project, task)) => (project.to_string(), task.to_string()),
            // A bare name addresses that task in every project
            None => (String::new(), body.to_string()),
        };

        if task_pattern.is_empty() {
            return Err(TargetError::InvalidFormat(s.to_string()).into());
        }

        Ok(Self {
            project_pattern,
            task_pattern,
            negated,
        })
    }

    fn matcher(pattern: &str) -> Result<Option<GlobMatcher>> {
        if pattern.is_empty() {
            return Ok(None);
        }

        let glob = Glob::new(pattern).map_err(|e| TargetError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Some(glob.compile_matcher()))
    }

    /// Check whether a concrete target matches this expression
    pub fn matches(&self, target: &Target) -> Result<bool> {
        if let Some(m) = Self::matcher(&self.project_pattern)? {
            if !m.is_match(&target.project) {
                return Ok(false);
            }
        }

        match Self::matcher(&self.task_pattern)? {
            Some(m) => Ok(m.is_match(&target.task)),
            None => Ok(false),
        }
    }
}

/// Expand target expressions against the full list of concrete targets.
///
/// Inclusions are evaluated first; exclusions are applied afterwards and
/// take precedence. An unmatched glob yields an empty set, not an error.
pub fn expand_targets(exprs: &[TargetExpr], all_targets: &[Target]) -> Result<Vec<Target>> {
    let mut selected: Vec<Target> = Vec::new();

    for target in all_targets {
        for expr in exprs.iter().filter(|e| !e.negated) {
            if expr.matches(target)? {
                selected.push(target.clone());
                break;
            }
        }
    }

    let exclusions: Vec<&TargetExpr> = exprs.iter().filter(|e| e.negated).collect();
    if !exclusions.is_empty() {
        let mut filtered = Vec::with_capacity(selected.len());
        for target in selected {
            let mut excluded = false;
            for expr in &exclusions {
                if expr.matches(&target)? {
                    excluded = true;
                    break;
                }
            }
            if !excluded {
                filtered.push(target);
            }
        }
        selected = filtered;
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_targets() -> Vec<Target> {
        vec![
            Target::new("lib", "build-debug"),
            Target::new("lib", "build-release"),
            Target::new("lib", "test"),
            Target::new("app", "build-debug"),
            Target::new("tools", "lint"),
        ]
    }

    #[test]
    fn test_target_display_roundtrip() {
        let target = Target::parse("lib:build").unwrap();
        assert_eq!(target.to_string(), "lib:build");
    }

    #[test]
    fn test_target_parse_invalid() {
        assert!(Target::parse("nobuild").is_err());
        assert!(Target::parse(":build").is_err());
        assert!(Target::parse("lib:").is_err());
    }

    #[test]
    fn test_expand_task_glob_across_projects() {
        let exprs = vec![TargetExpr::parse(":build-*").unwrap()];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();

        assert_eq!(expanded.len(), 3);
        assert!(expanded.contains(&Target::new("lib", "build-debug")));
        assert!(expanded.contains(&Target::new("lib", "build-release")));
        assert!(expanded.contains(&Target::new("app", "build-debug")));
    }

    #[test]
    fn test_expand_project_glob() {
        let exprs = vec![TargetExpr::parse("li*:test").unwrap()];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();

        assert_eq!(expanded, vec![Target::new("lib", "test")]);
    }

    #[test]
    fn test_unmatched_glob_yields_empty_set() {
        let exprs = vec![TargetExpr::parse(":deploy-*").unwrap()];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();
        assert!(expanded.is_empty());
    }

    #[test]
    fn test_exclusion_wins_over_glob() {
        let exprs = vec![
            TargetExpr::parse(":build-*").unwrap(),
            TargetExpr::parse("!lib:build-release").unwrap(),
        ];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();

        assert_eq!(expanded.len(), 2);
        assert!(!expanded.contains(&Target::new("lib", "build-release")));
    }

    #[test]
    fn test_brace_and_bracket_globs() {
        let exprs = vec![TargetExpr::parse("lib:build-{debug,release}").unwrap()];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();
        assert_eq!(expanded.len(), 2);

        let exprs = vec![TargetExpr::parse("[lt]*:lint").unwrap()];
        let expanded = expand_targets(&exprs, &all_targets()).unwrap();
        assert_eq!(expanded, vec![Target::new("tools", "lint")]);
    }

    #[test]
    fn test_invalid_glob_is_error() {
        let expr = TargetExpr::parse("lib:build[").unwrap();
        assert!(expr.matches(&Target::new("lib", "build")).is_err());
    }
}
