//! Actions — the unit of pipeline execution
//!
//! An action wraps one node of the action graph with its status machine
//! and recorded attempts. Status transitions are monotonic: a terminal
//! status is never overwritten.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gantry_core::Target;
use serde::{Deserialize, Serialize};

/// What an action does
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionNode {
    /// Resolve and install a toolchain requirement (e.g. "node@20")
    SetupToolchain { spec: String },
    /// Checkpoint a project's dependency state (lockfile hashes)
    InstallDeps { project: String },
    /// Sync workspace state into a project before its tasks run
    SyncProject { project: String },
    /// Execute one task target
    RunTask { target: Target },
}

impl ActionNode {
    /// Stable identifier, unique within an action graph
    pub fn id(&self) -> String {
        match self {
            Self::SetupToolchain { spec } => format!("setup-toolchain({})", spec),
            Self::InstallDeps { project } => format!("install-deps({})", project),
            Self::SyncProject { project } => format!("sync-project({})", project),
            Self::RunTask { target } => format!("run-task({})", target),
        }
    }

    /// Human-readable label for reports and logs
    pub fn label(&self) -> String {
        match self {
            Self::SetupToolchain { spec } => format!("Setup toolchain {}", spec),
            Self::InstallDeps { project } => format!("Install dependencies for {}", project),
            Self::SyncProject { project } => format!("Sync project {}", project),
            Self::RunTask { target } => format!("Run {}", target),
        }
    }

    /// Whether a failure of this action aborts the run by default.
    /// Environment-establishing actions abort; task failures abort only
    /// when the task opts in.
    pub fn aborts_on_failure(&self) -> bool {
        matches!(self, Self::SetupToolchain { .. } | Self::InstallDeps { .. })
    }
}

impl fmt::Display for ActionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Lifecycle status of an action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionStatus {
    /// Waiting on dependencies
    #[default]
    Pending,
    /// Currently executing
    Running,
    /// Restored from cache without executing
    Cached,
    /// Executed successfully
    Passed,
    /// Nothing to do (no command, dry run)
    Skipped,
    /// Executed and failed
    Failed,
    /// Executed, failed, and aborted the rest of the run
    FailedAndAbort,
    /// Not executed because an upstream action failed or the run was
    /// cancelled
    Invalid,
}

impl ActionStatus {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the status counts as a failure for exit-code purposes
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::FailedAndAbort | Self::Invalid)
    }

    /// Whether the status allows dependents to proceed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Cached | Self::Passed | Self::Skipped)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cached => "cached",
            Self::Passed => "passed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::FailedAndAbort => "failed-and-abort",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One execution attempt of an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt index
    pub index: u8,
    /// When the attempt started
    pub started_at: DateTime<Utc>,
    /// When the attempt finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Terminal status of the attempt
    pub status: ActionStatus,
    /// Failure message, when the attempt failed
    pub error: Option<String>,
}

impl Attempt {
    /// Start a new attempt
    pub fn new(index: u8) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            finished_at: None,
            status: ActionStatus::Running,
            error: None,
        }
    }

    /// Finish the attempt with a terminal status
    pub fn finish(&mut self, status: ActionStatus, error: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.status = status;
        self.error = error;
    }

    /// Wall-clock duration of the attempt
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .map(|end| (end - self.started_at).to_std().unwrap_or_default())
    }
}

/// An action in flight or completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Index into the action graph
    pub index: usize,
    /// What this action does
    pub node: ActionNode,
    /// Current status
    pub status: ActionStatus,
    /// Recorded execution attempts
    pub attempts: Vec<Attempt>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When execution reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message, when failed
    pub error: Option<String>,
    /// Invocation fingerprint, for task actions that were hashed
    pub hash: Option<String>,
}

impl Action {
    /// Create a pending action
    pub fn new(index: usize, node: ActionNode) -> Self {
        Self {
            index,
            node,
            status: ActionStatus::Pending,
            attempts: Vec::new(),
            started_at: None,
            finished_at: None,
            error: None,
            hash: None,
        }
    }

    /// Mark the action running
    pub fn start(&mut self) {
        if self.status == ActionStatus::Pending {
            self.status = ActionStatus::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Move to a terminal status. Once terminal, later calls are ignored.
    pub fn finish(&mut self, status: ActionStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration from start to terminal status
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).to_std().unwrap_or_default()),
            _ => None,
        }
    }

    /// An action is flaky when it ultimately passed but an earlier
    /// attempt failed
    pub fn is_flaky(&self) -> bool {
        self.status == ActionStatus::Passed
            && self
                .attempts
                .iter()
                .any(|a| a.status == ActionStatus::Failed)
    }

    /// Whether the action ran longer than the given threshold
    pub fn is_slow(&self, threshold: Duration) -> bool {
        self.duration().is_some_and(|d| d > threshold)
    }
}
