//! Error types for worker calls

use std::time::Duration;
use thiserror::Error;

use quanta_ipc::{IpcError, WorkerError};

/// Errors raised while reaching the computation worker
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// The transport to the worker is gone; every pending call fails with this
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Worker busy: {limit} calls already pending")]
    WorkerBusy { limit: usize },

    #[error("Call to '{method}' timed out after {}ms", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    /// The worker answered with `{error: {...}}`
    #[error("Worker error: {0}")]
    WorkerError(WorkerError),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker restart attempts exhausted after {attempts} attempts")]
    RestartsExhausted { attempts: u32 },

    #[error("Invalid worker state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ExecutionError {
    /// Failures of the channel to the worker rather than of the computation
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            ExecutionError::WorkerUnavailable(_)
                | ExecutionError::IpcError(_)
                | ExecutionError::SpawnFailed(_)
                | ExecutionError::RestartsExhausted { .. }
        )
    }

    /// Short machine-readable name for logs and error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::WorkerUnavailable(_) => "worker_unavailable",
            ExecutionError::WorkerBusy { .. } => "worker_busy",
            ExecutionError::Timeout { .. } => "timeout",
            ExecutionError::WorkerError(_) => "worker_error",
            ExecutionError::IpcError(_) => "ipc_error",
            ExecutionError::SpawnFailed(_) => "spawn_failed",
            ExecutionError::RestartsExhausted { .. } => "restarts_exhausted",
            ExecutionError::InvalidState(_) => "invalid_state",
            ExecutionError::ConfigurationError(_) => "configuration_error",
        }
    }

    /// Whether repeating the same call later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExecutionError::WorkerUnavailable(_)
                | ExecutionError::WorkerBusy { .. }
                | ExecutionError::Timeout { .. }
        )
    }
}

// Convert from IPC errors
impl From<IpcError> for ExecutionError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::ConnectionClosed => {
                Self::WorkerUnavailable("connection to worker closed".to_string())
            }
            other => Self::IpcError(other.to_string()),
        }
    }
}

impl From<WorkerError> for ExecutionError {
    fn from(err: WorkerError) -> Self {
        Self::WorkerError(err)
    }
}

// Convert from config errors
impl From<quanta_config::ConfigError> for ExecutionError {
    fn from(err: quanta_config::ConfigError) -> Self {
        Self::ConfigurationError(err.to_string())
    }
}
