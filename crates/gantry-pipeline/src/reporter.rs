//! Run progress reporting
//!
//! The pipeline emits [`ActionEvent`]s as actions move through their
//! lifecycle. Reporters are trait objects so the CLI can render progress
//! while tests capture the exact event stream.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::action::ActionStatus;

/// Progress events emitted during a run
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEvent {
    /// The run started with the given number of actions
    RunStarted { total: usize },
    /// An action began executing
    ActionStarted { index: usize, label: String },
    /// An action failed an attempt and will retry
    ActionRetrying { index: usize, label: String, attempt: u8 },
    /// An action reached a terminal status
    ActionFinished {
        index: usize,
        label: String,
        status: ActionStatus,
        duration: Option<Duration>,
    },
    /// The run is aborting because of the named action
    RunAborted { label: String },
    /// The run was cancelled from outside
    RunCancelled,
    /// The run completed
    RunFinished { duration: Duration, failed: usize },
}

/// Sink for run progress events
pub trait Reporter: Send + Sync {
    fn on_event(&self, event: &ActionEvent);
}

/// Reporter that logs events through `tracing`
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn on_event(&self, event: &ActionEvent) {
        match event {
            ActionEvent::RunStarted { total } => {
                info!(actions = total, "run started");
            }
            ActionEvent::ActionStarted { label, .. } => {
                debug!(action = %label, "action started");
            }
            ActionEvent::ActionRetrying { label, attempt, .. } => {
                warn!(action = %label, attempt, "action failed, retrying");
            }
            ActionEvent::ActionFinished {
                label,
                status,
                duration,
                ..
            } => {
                info!(action = %label, %status, ?duration, "action finished");
            }
            ActionEvent::RunAborted { label } => {
                warn!(action = %label, "aborting run");
            }
            ActionEvent::RunCancelled => {
                warn!("run cancelled");
            }
            ActionEvent::RunFinished { duration, failed } => {
                info!(?duration, failed, "run finished");
            }
        }
    }
}

/// Reporter that records every event, for assertions in tests
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ActionEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl Reporter for CollectingReporter {
    fn on_event(&self, event: &ActionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
