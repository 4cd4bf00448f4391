//! Machine-readable run reports

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionStatus, Attempt};

/// One action's outcome in a run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    /// Stable action id (e.g. "run-task(lib:build)")
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Terminal status
    pub status: ActionStatus,
    /// Wall-clock duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Recorded attempts
    pub attempts: Vec<Attempt>,
    /// Passed with an earlier failed attempt
    pub flaky: bool,
    /// Ran longer than the slow threshold
    pub slow: bool,
    /// Failure message, when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Invocation fingerprint, for hashed task actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Terminal status counts across a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
    pub invalid: usize,
}

impl RunSummary {
    /// Whether every action completed without a failure kind
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.invalid == 0
    }
}

/// Full report of one pipeline run, serializable to JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Total wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Per-action outcomes, in action-graph order
    pub actions: Vec<ActionReport>,
    /// Status counts
    pub summary: RunSummary,
}

impl RunReport {
    /// Build a report from completed actions
    pub fn from_actions(
        actions: &[Action],
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        slow_threshold: Duration,
    ) -> Self {
        let mut summary = RunSummary {
            total: actions.len(),
            ..Default::default()
        };

        let action_reports = actions
            .iter()
            .map(|action| {
                match action.status {
                    ActionStatus::Passed => summary.passed += 1,
                    ActionStatus::Cached => summary.cached += 1,
                    ActionStatus::Skipped => summary.skipped += 1,
                    ActionStatus::Failed | ActionStatus::FailedAndAbort => summary.failed += 1,
                    ActionStatus::Invalid => summary.invalid += 1,
                    ActionStatus::Pending | ActionStatus::Running => summary.invalid += 1,
                }

                ActionReport {
                    id: action.node.id(),
                    label: action.node.label(),
                    status: action.status,
                    duration_ms: action.duration().map(|d| d.as_millis() as u64),
                    attempts: action.attempts.clone(),
                    flaky: action.is_flaky(),
                    slow: action.is_slow(slow_threshold),
                    error: action.error.clone(),
                    hash: action.hash.clone(),
                }
            })
            .collect();

        Self {
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            actions: action_reports,
            summary,
        }
    }

    /// Whether the run completed without failures
    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Actions that passed only after retries
    pub fn flaky_actions(&self) -> impl Iterator<Item = &ActionReport> {
        self.actions.iter().filter(|a| a.flaky)
    }

    /// Actions slower than the threshold the report was built with
    pub fn slow_actions(&self) -> impl Iterator<Item = &ActionReport> {
        self.actions.iter().filter(|a| a.slow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionNode;
    use gantry_core::Target;

    fn finished_action(status: ActionStatus) -> Action {
        let mut action = Action::new(
            0,
            ActionNode::RunTask {
                target: Target::new("lib", "build"),
            },
        );
        action.start();
        action.finish(status, None);
        action
    }

    #[test]
    fn test_summary_counts() {
        let actions = vec![
            finished_action(ActionStatus::Passed),
            finished_action(ActionStatus::Cached),
            finished_action(ActionStatus::Failed),
            finished_action(ActionStatus::Invalid),
        ];

        let now = Utc::now();
        let report = RunReport::from_actions(&actions, now, now, Duration::from_secs(60));

        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.cached, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.invalid, 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_success_when_only_pass_kinds() {
        let actions = vec![
            finished_action(ActionStatus::Passed),
            finished_action(ActionStatus::Skipped),
            finished_action(ActionStatus::Cached),
        ];

        let now = Utc::now();
        let report = RunReport::from_actions(&actions, now, now, Duration::from_secs(60));
        assert!(report.is_success());
    }

    #[test]
    fn test_flaky_actions_surfaced() {
        let mut action = finished_action(ActionStatus::Passed);
        let mut failed = Attempt::new(1);
        failed.finish(ActionStatus::Failed, Some("exit 1".to_string()));
        action.attempts.insert(0, failed);

        let now = Utc::now();
        let report =
            RunReport::from_actions(&[action], now, now, Duration::from_secs(60));
        assert_eq!(report.flaky_actions().count(), 1);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let actions = vec![finished_action(ActionStatus::Passed)];
        let now = Utc::now();
        let report = RunReport::from_actions(&actions, now, now, Duration::from_secs(60));

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"passed\""));
        assert!(json.contains("\"id\":\"run-task(lib:build)\""));
    }
}
