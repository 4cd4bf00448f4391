//! Execution pipeline
//!
//! Drives an action graph to completion on a bounded worker pool. Actions
//! become ready when all dependencies reach a successful terminal status;
//! failures invalidate transitive dependents while independent branches
//! keep running. Setup and install failures, tasks that opt into
//! `abort_on_failure`, and the `bail` option abort the whole run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use gantry_cache::CacheStore;
use gantry_core::config::{RunnerConfig, WORKSPACE_DIRNAME};
use gantry_core::{Target, WorkspaceGraph};
use gantry_hash::{ContentHasher, Fingerprint};
use gantry_toolchain::{ResolvedToolchain, ToolchainRegistry};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, instrument, warn};

use crate::action::{Action, ActionNode, ActionStatus, Attempt};
use crate::error::{ExecutionError, PipelineError, Result};
use crate::graph::ActionGraph;
use crate::report::RunReport;
use crate::reporter::{ActionEvent, Reporter};

/// Tuning options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum concurrently running actions
    pub concurrency: usize,
    /// Cancel the rest of the run on the first failure
    pub bail: bool,
    /// Default extra attempts for tasks that don't set their own
    pub retry_count: u8,
    /// Actions slower than this are flagged in the report
    pub slow_threshold: Duration,
    /// How long in-flight actions get to finish after cancellation
    pub grace_period: Duration,
    /// Resolve and report without executing task commands
    pub dry_run: bool,
}

impl PipelineOptions {
    /// Derive options from workspace runner configuration
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            concurrency: config.concurrency.unwrap_or_else(default_concurrency),
            bail: config.bail,
            retry_count: config.retry_count,
            slow_threshold: Duration::from_secs(config.slow_threshold_secs),
            grace_period: Duration::from_secs(config.grace_period_secs),
            dry_run: false,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Handle for cancelling a running pipeline from another task
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. In-flight actions get the grace period,
    /// pending actions are invalidated.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Outcome of executing one action, sent back to the scheduler
struct Outcome {
    status: ActionStatus,
    attempts: Vec<Attempt>,
    error: Option<String>,
    hash: Option<String>,
}

impl Outcome {
    fn done(status: ActionStatus) -> Self {
        Self {
            status,
            attempts: Vec::new(),
            error: None,
            hash: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            status: ActionStatus::Failed,
            attempts: Vec::new(),
            error: Some(error),
            hash: None,
        }
    }
}

/// Shared state workers need while executing actions
struct ExecContext {
    workspace: Arc<WorkspaceGraph>,
    store: Arc<CacheStore>,
    toolchains: Arc<ToolchainRegistry>,
    options: PipelineOptions,
    reporters: Vec<Arc<dyn Reporter>>,
    /// Resolved toolchains keyed by requirement spec
    resolved_toolchains: Mutex<HashMap<String, ResolvedToolchain>>,
    /// One async mutex per fingerprint, so identical invocations execute
    /// at most once
    fingerprint_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    cancel_rx: watch::Receiver<bool>,
}

impl ExecContext {
    fn emit(&self, event: &ActionEvent) {
        for reporter in &self.reporters {
            reporter.on_event(event);
        }
    }

    fn fingerprint_lock(&self, hash: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .fingerprint_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks
            .entry(hash.as_str().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn toolchain_for(&self, spec: &str) -> Option<ResolvedToolchain> {
        self.resolved_toolchains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(spec)
            .cloned()
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

/// Drives an action graph to completion
pub struct Pipeline {
    workspace: Arc<WorkspaceGraph>,
    graph: ActionGraph,
    store: Arc<CacheStore>,
    toolchains: Arc<ToolchainRegistry>,
    options: PipelineOptions,
    reporters: Vec<Arc<dyn Reporter>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Pipeline {
    pub fn new(
        workspace: Arc<WorkspaceGraph>,
        graph: ActionGraph,
        store: Arc<CacheStore>,
        toolchains: Arc<ToolchainRegistry>,
        options: PipelineOptions,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            workspace,
            graph,
            store,
            toolchains,
            options,
            reporters: Vec::new(),
            cancel_tx,
            cancel_rx,
        }
    }

    /// Attach a progress reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Handle for cancelling the run (e.g. from a ctrl-c handler)
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Execute all actions and produce a run report
    #[instrument(skip_all, fields(actions = self.graph.len()))]
    pub async fn run(self) -> Result<RunReport> {
        let started_at = Utc::now();
        let total = self.graph.len();

        let ctx = Arc::new(ExecContext {
            workspace: self.workspace.clone(),
            store: self.store.clone(),
            toolchains: self.toolchains.clone(),
            options: self.options.clone(),
            reporters: self.reporters.clone(),
            resolved_toolchains: Mutex::new(HashMap::new()),
            fingerprint_locks: Mutex::new(HashMap::new()),
            cancel_rx: self.cancel_rx.clone(),
        });

        ctx.emit(&ActionEvent::RunStarted { total });

        let mut actions: Vec<Action> = self
            .graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| Action::new(i, node.clone()))
            .collect();

        let mut remaining: Vec<usize> = (0..total)
            .map(|i| self.graph.dependencies_of(i).len())
            .collect();
        let mut ready: Vec<usize> = (0..total).filter(|i| remaining[*i] == 0).collect();

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Outcome)>();

        let mut completed = 0usize;
        let mut aborting = false;
        let mut cancelled_reported = false;

        while completed < total {
            // Dispatch everything ready. Under abort or cancellation,
            // pending actions are invalidated instead of executed.
            for index in std::mem::take(&mut ready) {
                if actions[index].status != ActionStatus::Pending {
                    continue;
                }

                if aborting || ctx.is_cancelled() {
                    if ctx.is_cancelled() && !cancelled_reported {
                        cancelled_reported = true;
                        ctx.emit(&ActionEvent::RunCancelled);
                    }
                    self.complete(
                        &mut actions,
                        &mut remaining,
                        &mut ready,
                        &mut completed,
                        &ctx,
                        index,
                        Outcome::done(ActionStatus::Invalid),
                    );
                    continue;
                }

                actions[index].start();
                ctx.emit(&ActionEvent::ActionStarted {
                    index,
                    label: actions[index].node.label(),
                });

                let ctx = ctx.clone();
                let node = actions[index].node.clone();
                let tx = tx.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let outcome = execute_action(&ctx, index, &node).await;
                    let _ = tx.send((index, outcome));
                });
            }

            if completed >= total {
                break;
            }

            let Some((index, outcome)) = rx.recv().await else {
                return Err(PipelineError::Worker(
                    "completion channel closed unexpectedly".to_string(),
                ));
            };

            let status = self.finalize_status(&actions[index].node, outcome.status);
            if status == ActionStatus::FailedAndAbort {
                aborting = true;
                ctx.emit(&ActionEvent::RunAborted {
                    label: actions[index].node.label(),
                });
            } else if status.is_failure() && self.options.bail {
                aborting = true;
            }

            self.complete(
                &mut actions,
                &mut remaining,
                &mut ready,
                &mut completed,
                &ctx,
                index,
                Outcome { status, ..outcome },
            );
        }

        let finished_at = Utc::now();
        let report = RunReport::from_actions(
            &actions,
            started_at,
            finished_at,
            self.options.slow_threshold,
        );
        ctx.emit(&ActionEvent::RunFinished {
            duration: (finished_at - started_at).to_std().unwrap_or_default(),
            failed: report.summary.failed + report.summary.invalid,
        });

        Ok(report)
    }

    /// Apply the abort policy to a raw execution status
    fn finalize_status(&self, node: &ActionNode, status: ActionStatus) -> ActionStatus {
        if status != ActionStatus::Failed {
            return status;
        }

        let aborts = node.aborts_on_failure()
            || match node {
                ActionNode::RunTask { target } => self
                    .workspace
                    .get_task(target)
                    .map(|t| t.options.abort_on_failure)
                    .unwrap_or(false),
                _ => false,
            };

        if aborts {
            ActionStatus::FailedAndAbort
        } else {
            ActionStatus::Failed
        }
    }

    /// Record a terminal outcome, invalidate dependents on failure, and
    /// release newly ready actions.
    #[allow(clippy::too_many_arguments)]
    fn complete(
        &self,
        actions: &mut [Action],
        remaining: &mut [usize],
        ready: &mut Vec<usize>,
        completed: &mut usize,
        ctx: &ExecContext,
        index: usize,
        outcome: Outcome,
    ) {
        if actions[index].status.is_terminal() {
            return;
        }

        actions[index].attempts = outcome.attempts;
        actions[index].hash = outcome.hash;
        actions[index].finish(outcome.status, outcome.error);
        *completed += 1;

        ctx.emit(&ActionEvent::ActionFinished {
            index,
            label: actions[index].node.label(),
            status: actions[index].status,
            duration: actions[index].duration(),
        });

        if actions[index].status.is_failure() {
            for dependent in self.graph.transitive_dependents_of(index) {
                if actions[dependent].status.is_terminal() {
                    continue;
                }
                actions[dependent].finish(ActionStatus::Invalid, None);
                *completed += 1;
                ctx.emit(&ActionEvent::ActionFinished {
                    index: dependent,
                    label: actions[dependent].node.label(),
                    status: ActionStatus::Invalid,
                    duration: None,
                });
            }
        }

        // Release dependents whose dependencies are now all terminal
        for dependent in self.graph.dependents_of(index) {
            remaining[*dependent] = remaining[*dependent].saturating_sub(1);
            if remaining[*dependent] == 0 && actions[*dependent].status == ActionStatus::Pending {
                ready.push(*dependent);
            }
        }
    }
}

/// Execute one action, mapping errors into a failed outcome
async fn execute_action(ctx: &ExecContext, index: usize, node: &ActionNode) -> Outcome {
    let result = match node {
        ActionNode::SetupToolchain { spec } => setup_toolchain(ctx, spec).await,
        ActionNode::InstallDeps { project } => install_deps(ctx, project).await,
        ActionNode::SyncProject { project } => sync_project(ctx, project).await,
        ActionNode::RunTask { target } => run_task(ctx, index, target).await,
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => Outcome::failed(e.to_string()),
    }
}

async fn setup_toolchain(ctx: &ExecContext, spec: &str) -> Result<Outcome> {
    let resolved = ctx.toolchains.setup(spec).await?;
    debug!(%spec, version = %resolved.version, "toolchain ready");

    ctx.resolved_toolchains
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(spec.to_string(), resolved);

    Ok(Outcome::done(ActionStatus::Passed))
}

/// Lockfile names recognized as dependency state
const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "go.sum",
];

/// Checkpoint the project's dependency state. The combined lockfile digest
/// is compared with the last recorded one; an unchanged digest means
/// dependencies need no attention and the action is skipped. Installation
/// itself is left to ordinary tasks.
async fn install_deps(ctx: &ExecContext, project: &str) -> Result<Outcome> {
    let project = ctx.workspace.project(project)?;
    let project_dir = ctx.workspace.root().join(&project.source);

    let mut hasher = Sha256::new();
    let mut found = false;
    for lockfile in LOCKFILES {
        let path = project_dir.join(lockfile);
        if path.is_file() {
            hasher.update(lockfile.as_bytes());
            hasher.update(std::fs::read(&path).map_err(PipelineError::Io)?);
            found = true;
        }
    }

    if !found {
        return Ok(Outcome::done(ActionStatus::Skipped));
    }

    let digest = format!("{:x}", hasher.finalize());
    let state_path = state_dir(ctx.workspace.root(), &project.id).join("deps.hash");

    let previous = std::fs::read_to_string(&state_path).ok();
    if previous.as_deref() == Some(digest.as_str()) {
        debug!(project = %project.id, "dependency state unchanged");
        return Ok(Outcome::done(ActionStatus::Skipped));
    }

    if let Some(parent) = state_path.parent() {
        std::fs::create_dir_all(parent).map_err(PipelineError::Io)?;
    }
    std::fs::write(&state_path, &digest).map_err(PipelineError::Io)?;
    debug!(project = %project.id, "dependency state recorded");

    Ok(Outcome::done(ActionStatus::Passed))
}

/// Write the project snapshot other tools (and cached replays) rely on
async fn sync_project(ctx: &ExecContext, project: &str) -> Result<Outcome> {
    let project = ctx.workspace.project(project)?;
    let dir = state_dir(ctx.workspace.root(), &project.id);
    std::fs::create_dir_all(&dir).map_err(PipelineError::Io)?;

    let snapshot = serde_json::to_string_pretty(project)?;
    std::fs::write(dir.join("snapshot.json"), snapshot).map_err(PipelineError::Io)?;

    Ok(Outcome::done(ActionStatus::Passed))
}

fn state_dir(root: &Path, project: &str) -> PathBuf {
    root.join(WORKSPACE_DIRNAME).join("states").join(project)
}

async fn run_task(ctx: &ExecContext, index: usize, target: &Target) -> Result<Outcome> {
    let task = ctx.workspace.get_task(target)?.clone();
    let project = ctx.workspace.project(&target.project)?.clone();
    let project_dir = ctx.workspace.root().join(&project.source);

    let Some(command_line) = task.command_line() else {
        return Ok(Outcome::done(ActionStatus::Skipped));
    };

    if ctx.options.dry_run {
        debug!(%target, command = %command_line, "dry run, skipping execution");
        return Ok(Outcome::done(ActionStatus::Skipped));
    }

    let toolchain = project
        .toolchain
        .as_deref()
        .and_then(|spec| ctx.toolchain_for(spec));
    let toolchain_ids: Vec<String> = toolchain.iter().map(|t| t.hash_id()).collect();

    let hasher = ContentHasher::new(ctx.workspace.root());
    let manifest = hasher.hash_task(&project.source, &task, &toolchain_ids)?;
    let hash = manifest.fingerprint();
    ctx.store.record_manifest(&hash, &manifest)?;

    // Identical invocations execute at most once; the second arrival waits
    // here and then hits the cache entry the first one wrote.
    let lock = ctx.fingerprint_lock(&hash);
    let _guard = lock.lock_owned().await;

    if task.options.cache {
        match ctx.store.load(&hash, &project_dir).await {
            Ok(true) => {
                if let Some((stdout, stderr)) = ctx.store.load_logs(&hash) {
                    if !stdout.is_empty() {
                        print!("{}", stdout);
                    }
                    if !stderr.is_empty() {
                        eprint!("{}", stderr);
                    }
                }
                return Ok(Outcome {
                    status: ActionStatus::Cached,
                    attempts: Vec::new(),
                    error: None,
                    hash: Some(hash.as_str().to_string()),
                });
            }
            Ok(false) => {}
            Err(e) => warn!(%target, error = %e, "cache lookup failed, executing"),
        }
    }

    let max_attempts = 1 + if task.options.retry_count > 0 {
        task.options.retry_count
    } else {
        ctx.options.retry_count
    };

    let mut attempts = Vec::new();
    let mut last_error = None;

    for attempt_index in 1..=max_attempts {
        let mut attempt = Attempt::new(attempt_index);

        let result = spawn_task_process(ctx, &task, &project_dir, toolchain.as_ref()).await;

        match result {
            Ok(output) => {
                attempt.finish(ActionStatus::Passed, None);
                attempts.push(attempt);

                print!("{}", output.stdout);
                eprint!("{}", output.stderr);

                if task.options.cache {
                    if let Err(e) = ctx.store.save_logs(&hash, &output.stdout, &output.stderr) {
                        warn!(%target, error = %e, "failed to record task logs");
                    }
                    if let Err(e) = ctx
                        .store
                        .save(&hash, &project_dir, &task.outputs)
                        .await
                    {
                        warn!(%target, error = %e, "failed to write cache entry");
                    }
                }

                return Ok(Outcome {
                    status: ActionStatus::Passed,
                    attempts,
                    error: None,
                    hash: Some(hash.as_str().to_string()),
                });
            }
            Err(e) => {
                let cancelled = matches!(e, ExecutionError::Cancelled);
                let message = e.to_string();
                attempt.finish(ActionStatus::Failed, Some(message.clone()));
                attempts.push(attempt);
                last_error = Some(message);

                if cancelled {
                    break;
                }
                if attempt_index < max_attempts {
                    ctx.emit(&ActionEvent::ActionRetrying {
                        index,
                        label: format!("Run {}", target),
                        attempt: attempt_index,
                    });
                }
            }
        }
    }

    Ok(Outcome {
        status: ActionStatus::Failed,
        attempts,
        error: last_error,
        hash: Some(hash.as_str().to_string()),
    })
}

struct ProcessOutput {
    stdout: String,
    stderr: String,
}

/// Spawn the task command and wait for it, honoring the per-task timeout
/// and run cancellation (grace period, then kill).
async fn spawn_task_process(
    ctx: &ExecContext,
    task: &gantry_core::Task,
    project_dir: &Path,
    toolchain: Option<&ResolvedToolchain>,
) -> std::result::Result<ProcessOutput, ExecutionError> {
    let command_line = task
        .command_line()
        .ok_or_else(|| ExecutionError::MissingCommand(task.target.to_string()))?;
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| ExecutionError::MissingCommand(task.target.to_string()))?;

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(parts)
        .current_dir(project_dir)
        .envs(&task.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(toolchain) = toolchain {
        for (name, value) in &toolchain.env {
            cmd.env(name, value);
        }
        if !toolchain.bin_dirs.is_empty() {
            cmd.env("PATH", prepend_path(&toolchain.bin_dirs));
        }
    }

    let mut child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
        command: command_line.clone(),
        message: e.to_string(),
    })?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    let mut cancel_rx = ctx.cancel_rx.clone();
    let timeout = task.options.timeout;

    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|e| ExecutionError::Spawn {
                command: command_line.clone(),
                message: e.to_string(),
            })?
        }
        _ = sleep_or_forever(timeout) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(ExecutionError::Timeout(
                timeout.map(|t| t.as_secs()).unwrap_or_default(),
            ));
        }
        _ = wait_cancelled(&mut cancel_rx) => {
            // Grace period before the kill
            tokio::select! {
                _ = child.wait() => {}
                _ = tokio::time::sleep(ctx.options.grace_period) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
            return Err(ExecutionError::Cancelled);
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(ProcessOutput { stdout, stderr })
    } else {
        // Surface captured output even for failed attempts
        print!("{}", stdout);
        eprint!("{}", stderr);

        match status.code() {
            Some(code) => Err(ExecutionError::NonZeroExit {
                command: command_line,
                code,
            }),
            None => Err(ExecutionError::Terminated {
                command: command_line,
            }),
        }
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Prepend toolchain bin directories to the inherited PATH
fn prepend_path(bin_dirs: &[PathBuf]) -> std::ffi::OsString {
    let mut paths: Vec<PathBuf> = bin_dirs.to_vec();
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(paths).unwrap_or_else(|_| {
        std::env::var_os("PATH").unwrap_or_default()
    })
}
