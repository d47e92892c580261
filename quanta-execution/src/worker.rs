//! Worker process supervision
//!
//! Owns at most one live computation worker. The lifecycle follows
//! `NotStarted -> Starting -> Running -> (Crashed | Stopping) -> Stopped`;
//! a crashed worker only comes back through an explicit, bounded [`WorkerSupervisor::restart`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use quanta_ipc::ChildProcessTransport;

use crate::error::ExecutionError;

/// How long to wait for the process to be reaped after a kill
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Configuration for the supervised worker process
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub max_restart_attempts: u32,
    pub restart_delay: Duration,
    pub restart_window: Duration,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["worker.py".to_string()],
            working_dir: None,
            env: HashMap::new(),
            max_restart_attempts: 3,
            restart_delay: Duration::from_secs(1),
            restart_window: Duration::from_secs(60),
        }
    }
}

impl From<&quanta_config::WorkerConfig> for SupervisorConfig {
    fn from(config: &quanta_config::WorkerConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
            max_restart_attempts: config.max_restart_attempts,
            restart_delay: config.restart_delay,
            restart_window: config.restart_window,
        }
    }
}

/// Worker process status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerProcessStatus {
    NotStarted,
    Starting,
    Running,
    Crashed,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerProcessStatus::NotStarted => "not started",
            WorkerProcessStatus::Starting => "starting",
            WorkerProcessStatus::Running => "running",
            WorkerProcessStatus::Crashed => "crashed",
            WorkerProcessStatus::Stopping => "stopping",
            WorkerProcessStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Termination report passed to exit handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerExit {
    pub generation: u64,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    /// True when the exit followed a shutdown request
    pub intentional: bool,
}

/// Handle to the running worker.
///
/// Only the call that actually spawned the process receives its stdio
/// transport; every other caller gets a handle without one.
#[derive(Debug)]
pub struct WorkerHandle {
    pub generation: u64,
    pub pid: Option<u32>,
    transport: Option<ChildProcessTransport>,
}

impl WorkerHandle {
    /// Take the worker's stdio pipes, if this handle carries them
    pub fn take_transport(&mut self) -> Option<ChildProcessTransport> {
        self.transport.take()
    }

    /// Whether this handle came from a fresh spawn
    pub fn is_fresh(&self) -> bool {
        self.transport.is_some()
    }
}

/// Snapshot of the supervised worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub status: WorkerProcessStatus,
    pub generation: u64,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<i64>,
    pub last_exit: Option<WorkerExit>,
}

type ExitHandler = Arc<dyn Fn(&WorkerExit) + Send + Sync>;

struct SupervisorState {
    status: WorkerProcessStatus,
    generation: u64,
    pid: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    last_uptime: Option<Duration>,
    restart_count: u32,
    exhausted_reported: bool,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: Option<watch::Receiver<Option<WorkerExit>>>,
    last_exit: Option<WorkerExit>,
}

impl SupervisorState {
    fn new() -> Self {
        Self {
            status: WorkerProcessStatus::NotStarted,
            generation: 0,
            pid: None,
            started_at: None,
            started_instant: None,
            last_uptime: None,
            restart_count: 0,
            exhausted_reported: false,
            kill_tx: None,
            exit_rx: None,
            last_exit: None,
        }
    }

    fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            generation: self.generation,
            pid: self.pid,
            transport: None,
        }
    }
}

/// Owns exactly one worker process instance
pub struct WorkerSupervisor {
    config: SupervisorConfig,
    /// Serializes start, restart, kill and shutdown
    lifecycle: tokio::sync::Mutex<()>,
    state: Arc<Mutex<SupervisorState>>,
    handlers: Arc<RwLock<Vec<ExitHandler>>>,
}

impl WorkerSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            state: Arc::new(Mutex::new(SupervisorState::new())),
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Spawn the worker unless one is already running.
    ///
    /// A crashed worker is not brought back here; use [`restart`](Self::restart).
    pub async fn ensure_started(&self) -> Result<WorkerHandle, ExecutionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let status = lock(&self.state).status;
        match status {
            WorkerProcessStatus::NotStarted => self.spawn_worker(),
            WorkerProcessStatus::Running => Ok(lock(&self.state).handle()),
            WorkerProcessStatus::Crashed => Err(ExecutionError::WorkerUnavailable(
                "worker crashed; an explicit restart is required".to_string(),
            )),
            other => Err(ExecutionError::InvalidState(format!(
                "cannot start a worker that is {}",
                other
            ))),
        }
    }

    /// Bring a crashed worker back, within the restart budget
    pub async fn restart(&self) -> Result<WorkerHandle, ExecutionError> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut state = lock(&self.state);
            match state.status {
                WorkerProcessStatus::Running => return Ok(state.handle()),
                WorkerProcessStatus::NotStarted => {}
                WorkerProcessStatus::Crashed => {
                    if state
                        .last_uptime
                        .is_some_and(|uptime| uptime >= self.config.restart_window)
                    {
                        debug!("Worker was stable before crashing; resetting restart budget");
                        state.restart_count = 0;
                        state.exhausted_reported = false;
                    }

                    if state.restart_count >= self.config.max_restart_attempts {
                        if !state.exhausted_reported {
                            error!(
                                attempts = state.restart_count,
                                "Worker restart attempts exhausted; giving up"
                            );
                            state.exhausted_reported = true;
                        }
                        return Err(ExecutionError::RestartsExhausted {
                            attempts: state.restart_count,
                        });
                    }

                    state.restart_count += 1;
                    state.status = WorkerProcessStatus::Starting;
                    info!(
                        attempt = state.restart_count,
                        max_attempts = self.config.max_restart_attempts,
                        "Restarting worker process"
                    );
                }
                other => {
                    return Err(ExecutionError::InvalidState(format!(
                        "cannot restart a worker that is {}",
                        other
                    )))
                }
            }
        }

        if !self.config.restart_delay.is_zero() {
            tokio::time::sleep(self.config.restart_delay).await;
        }

        self.spawn_worker()
    }

    /// Register a callback invoked whenever a worker process terminates
    pub fn on_exit<F>(&self, handler: F)
    where
        F: Fn(&WorkerExit) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::new(handler));
    }

    /// Request a cooperative exit and kill the worker once `grace` elapses.
    ///
    /// The cooperative signal is end of input: whoever holds the worker's stdin
    /// closes it before (or while) this waits.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ExecutionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let exit_rx = {
            let mut state = lock(&self.state);
            match state.status {
                WorkerProcessStatus::Running => {
                    state.status = WorkerProcessStatus::Stopping;
                    state.exit_rx.clone()
                }
                WorkerProcessStatus::Stopped => return Ok(()),
                _ => {
                    state.status = WorkerProcessStatus::Stopped;
                    return Ok(());
                }
            }
        };
        let mut exit_rx = exit_rx.ok_or_else(|| {
            ExecutionError::InvalidState("running worker has no exit monitor".to_string())
        })?;

        info!(grace_ms = grace.as_millis() as u64, "Stopping worker process");
        let exited = tokio::time::timeout(grace, exit_rx.wait_for(Option::is_some))
            .await
            .is_ok();
        if exited {
            return Ok(());
        }

        warn!(
            grace_ms = grace.as_millis() as u64,
            "Worker did not exit within grace period; killing it"
        );
        let kill_tx = lock(&self.state).kill_tx.take();
        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }

        let reaped = tokio::time::timeout(KILL_WAIT, exit_rx.wait_for(Option::is_some))
            .await
            .is_ok();
        if reaped {
            Ok(())
        } else {
            Err(ExecutionError::InvalidState(
                "worker did not exit after being killed".to_string(),
            ))
        }
    }

    /// Forcibly terminate the running worker. The exit counts as a crash.
    pub async fn kill(&self) -> Result<(), ExecutionError> {
        let _lifecycle = self.lifecycle.lock().await;

        let (kill_tx, exit_rx) = {
            let mut state = lock(&self.state);
            if state.status != WorkerProcessStatus::Running {
                return Ok(());
            }
            (state.kill_tx.take(), state.exit_rx.clone())
        };

        warn!("Killing worker process");
        if let Some(kill_tx) = kill_tx {
            let _ = kill_tx.send(());
        }
        if let Some(mut exit_rx) = exit_rx {
            let _ = tokio::time::timeout(KILL_WAIT, exit_rx.wait_for(Option::is_some)).await;
        }
        Ok(())
    }

    pub fn status(&self) -> WorkerProcessStatus {
        lock(&self.state).status
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.state).pid
    }

    /// Generation of the most recently spawned process
    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Succeeds only while the worker is running
    pub fn health_check(&self) -> Result<(), ExecutionError> {
        match self.status() {
            WorkerProcessStatus::Running => Ok(()),
            other => Err(ExecutionError::WorkerUnavailable(format!("worker is {}", other))),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        let state = lock(&self.state);
        let running = state.status == WorkerProcessStatus::Running;
        WorkerStats {
            status: state.status,
            generation: state.generation,
            pid: state.pid,
            restart_count: state.restart_count,
            started_at: state.started_at,
            uptime_seconds: state
                .started_at
                .filter(|_| running)
                .map(|started| Utc::now().signed_duration_since(started).num_seconds()),
            last_exit: state.last_exit.clone(),
        }
    }

    /// Spawn a process and its exit monitor. Callers hold the lifecycle lock.
    fn spawn_worker(&self) -> Result<WorkerHandle, ExecutionError> {
        lock(&self.state).status = WorkerProcessStatus::Starting;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.mark_spawn_failed();
                return Err(ExecutionError::SpawnFailed(format!(
                    "{}: {}",
                    self.config.program, e
                )));
            }
        };

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.start_kill();
                self.mark_spawn_failed();
                return Err(ExecutionError::SpawnFailed(
                    "worker stdio was not captured".to_string(),
                ));
            }
        };

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.status = WorkerProcessStatus::Running;
            state.pid = pid;
            state.started_at = Some(Utc::now());
            state.started_instant = Some(Instant::now());
            state.kill_tx = Some(kill_tx);
            state.exit_rx = Some(exit_rx);
            state.generation
        };

        info!(
            pid = ?pid,
            generation,
            program = %self.config.program,
            "Worker process started"
        );

        tokio::spawn(monitor_worker(
            child,
            generation,
            kill_rx,
            exit_tx,
            Arc::clone(&self.state),
            Arc::clone(&self.handlers),
        ));

        Ok(WorkerHandle {
            generation,
            pid,
            transport: Some(ChildProcessTransport::new(stdin, stdout)),
        })
    }

    fn mark_spawn_failed(&self) {
        let mut state = lock(&self.state);
        state.status = WorkerProcessStatus::Crashed;
        state.pid = None;
        state.last_uptime = None;
    }
}

/// Wait for the process to end, record how, and notify exit handlers
async fn monitor_worker(
    mut child: Child,
    generation: u64,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    state: Arc<Mutex<SupervisorState>>,
    handlers: Arc<RwLock<Vec<ExitHandler>>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!(generation, error = %e, "Failed to kill worker process");
            }
            child.wait().await
        }
    };

    let (code, signal) = match &status {
        Ok(status) => (status.code(), exit_signal(status)),
        Err(e) => {
            warn!(generation, error = %e, "Failed to collect worker exit status");
            (None, None)
        }
    };

    let exit = {
        let mut state = lock(&state);
        let current = state.generation == generation;
        let exit = WorkerExit {
            generation,
            code,
            signal,
            intentional: current && state.status == WorkerProcessStatus::Stopping,
        };
        if current {
            state.status = if exit.intentional {
                WorkerProcessStatus::Stopped
            } else {
                WorkerProcessStatus::Crashed
            };
            state.pid = None;
            state.last_uptime = state.started_instant.map(|started| started.elapsed());
            state.kill_tx = None;
            state.last_exit = Some(exit.clone());
        }
        exit
    };

    if exit.intentional {
        info!(generation, code = ?code, "Worker process stopped");
    } else {
        warn!(generation, code = ?code, signal = ?signal, "Worker process exited unexpectedly");
    }

    let _ = exit_tx.send(Some(exit.clone()));

    let handlers: Vec<ExitHandler> = handlers
        .read()
        .map(|handlers| handlers.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    for handler in handlers {
        handler(&exit);
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
