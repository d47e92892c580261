//! Process-backed worker bridge
//!
//! The single service object that owns the worker supervisor and the RPC
//! client. It is constructed once at startup and handed to the MCP layer.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ExecutionError;
use crate::executor::WorkerBackend;
use crate::rpc::{RpcClient, RpcClientConfig, RpcStats};
use crate::worker::{
    SupervisorConfig, WorkerExit, WorkerProcessStatus, WorkerStats, WorkerSupervisor,
};

/// Configuration for the process bridge
#[derive(Debug, Clone)]
pub struct WorkerBridgeConfig {
    pub supervisor: SupervisorConfig,
    pub rpc: RpcClientConfig,
    /// Restart a crashed worker on the next call instead of failing fast
    pub restart_on_crash: bool,
    pub max_frame_bytes: Option<usize>,
}

impl Default for WorkerBridgeConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            rpc: RpcClientConfig::default(),
            restart_on_crash: true,
            max_frame_bytes: None,
        }
    }
}

impl WorkerBridgeConfig {
    /// Build from the worker domain, with calls defaulting to `default_timeout`
    pub fn from_config(config: &quanta_config::WorkerConfig, default_timeout: Duration) -> Self {
        Self {
            supervisor: SupervisorConfig::from(config),
            rpc: RpcClientConfig {
                default_timeout,
                max_pending_calls: config.max_pending_calls,
            },
            restart_on_crash: config.restart_on_crash,
            max_frame_bytes: config.max_frame_bytes,
        }
    }
}

/// Combined view of the process and the call channel
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    pub worker: WorkerStats,
    pub rpc: RpcStats,
}

/// Worker generation paired with the transport generation attached for it
type Attachment = Arc<Mutex<Option<(u64, u64)>>>;

/// Worker backend that talks to a supervised child process
pub struct ProcessWorkerBridge {
    supervisor: Arc<WorkerSupervisor>,
    client: RpcClient,
    attachment: Attachment,
    connect_lock: tokio::sync::Mutex<()>,
    restart_on_crash: bool,
    max_frame_bytes: Option<usize>,
}

impl ProcessWorkerBridge {
    pub fn new(config: WorkerBridgeConfig) -> Self {
        let supervisor = Arc::new(WorkerSupervisor::new(config.supervisor));
        let client = RpcClient::new(config.rpc);

        let attachment: Attachment = Arc::new(Mutex::new(None));

        // The worker's stdout can outlive it (a grandchild may hold the pipe),
        // so a crash detaches the transport instead of waiting for EOF
        let watched = client.clone();
        let watched_attachment = Arc::clone(&attachment);
        supervisor.on_exit(move |exit| {
            if exit.intentional {
                return;
            }
            let current = *lock(&watched_attachment);
            let transport = current
                .filter(|(worker, _)| *worker == exit.generation)
                .map(|(_, transport)| transport);
            if let Some(transport) = transport {
                warn!(
                    generation = exit.generation,
                    pending = watched.pending_count(),
                    "Worker exited unexpectedly; failing its pending calls"
                );
                watched.fail_generation(transport, &exit_reason(exit));
            }
        });

        Self {
            supervisor,
            client,
            attachment,
            connect_lock: tokio::sync::Mutex::new(()),
            restart_on_crash: config.restart_on_crash,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Spawn the worker now instead of on the first call
    pub async fn start(&self) -> Result<(), ExecutionError> {
        self.ensure_connected().await
    }

    pub fn supervisor(&self) -> &WorkerSupervisor {
        &self.supervisor
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            worker: self.supervisor.stats(),
            rpc: self.client.stats(),
        }
    }

    fn is_ready(&self) -> bool {
        self.client.is_connected() && self.supervisor.status() == WorkerProcessStatus::Running
    }

    /// Make sure a live worker is attached to the client, restarting a crashed one
    /// when the policy allows it
    async fn ensure_connected(&self) -> Result<(), ExecutionError> {
        if self.is_ready() {
            return Ok(());
        }

        let _connecting = self.connect_lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        let mut handle = match self.supervisor.status() {
            WorkerProcessStatus::NotStarted => self.supervisor.ensure_started().await?,
            WorkerProcessStatus::Crashed => {
                if !self.restart_on_crash {
                    return Err(ExecutionError::WorkerUnavailable(
                        "worker crashed and restart_on_crash is disabled".to_string(),
                    ));
                }
                self.supervisor.restart().await?
            }
            WorkerProcessStatus::Running => {
                // Process is alive but its pipes are gone; it cannot be reattached
                warn!("Worker transport closed while the process is still running");
                self.supervisor.kill().await?;
                if !self.restart_on_crash {
                    return Err(ExecutionError::WorkerUnavailable(
                        "worker transport closed and restart_on_crash is disabled".to_string(),
                    ));
                }
                self.supervisor.restart().await?
            }
            WorkerProcessStatus::Starting => {
                return Err(ExecutionError::InvalidState(
                    "worker is still starting".to_string(),
                ))
            }
            WorkerProcessStatus::Stopping | WorkerProcessStatus::Stopped => {
                return Err(ExecutionError::WorkerUnavailable(
                    "worker has been shut down".to_string(),
                ))
            }
        };

        let transport = handle.take_transport().ok_or_else(|| {
            ExecutionError::InvalidState("worker handle carries no transport".to_string())
        })?;
        let (reader, writer) = transport.into_parts(self.max_frame_bytes);
        let generation = self.client.attach(reader, writer);
        *lock(&self.attachment) = Some((handle.generation, generation));

        // The worker may have died before the attachment was recorded
        if self.supervisor.generation() != handle.generation
            || self.supervisor.status() != WorkerProcessStatus::Running
        {
            self.client
                .fail_generation(generation, "worker process exited during startup");
            return Err(ExecutionError::WorkerUnavailable(
                "worker process exited during startup".to_string(),
            ));
        }

        info!(
            worker_generation = handle.generation,
            transport_generation = generation,
            pid = ?handle.pid,
            "Worker connected"
        );
        Ok(())
    }
}

fn exit_reason(exit: &WorkerExit) -> String {
    match (exit.code, exit.signal) {
        (Some(code), _) => format!("worker process exited with code {}", code),
        (None, Some(signal)) => format!("worker process killed by signal {}", signal),
        (None, None) => "worker process exited".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl WorkerBackend for ProcessWorkerBridge {
    async fn call(
        &self,
        method: &str,
        params: JsonValue,
        timeout: Option<Duration>,
    ) -> Result<JsonValue, ExecutionError> {
        self.ensure_connected().await?;
        self.client.call(method, params, timeout).await
    }

    async fn health_check(&self) -> Result<(), ExecutionError> {
        self.supervisor.health_check()?;
        if !self.client.is_connected() {
            return Err(ExecutionError::WorkerUnavailable(
                "worker transport is not attached".to_string(),
            ));
        }
        Ok(())
    }

    async fn shutdown(&self, grace: Duration) -> Result<(), ExecutionError> {
        info!("Shutting down worker bridge");
        self.client.close();
        self.supervisor.shutdown(grace).await
    }
}
