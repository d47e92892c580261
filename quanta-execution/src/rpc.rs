//! Request/response correlation over a single worker transport
//!
//! Many calls can be in flight at once. Each gets a fresh id and a slot in the
//! pending table; a reader task routes every response to its slot by id alone,
//! so the worker may answer in any order. A writer task owns the outbound half
//! so no caller ever holds the pipe while waiting.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use quanta_ipc::{FrameReader, FrameWriter, RequestId, WorkerRequest, WorkerResponse};

use crate::error::ExecutionError;

/// RPC client configuration
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Applied when a call does not carry its own timeout
    pub default_timeout: Duration,
    /// Reject new calls with [`ExecutionError::WorkerBusy`] beyond this many pending
    pub max_pending_calls: Option<usize>,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            max_pending_calls: Some(256),
        }
    }
}

/// Counters exposed for telemetry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RpcStats {
    pub calls_issued: u64,
    pub calls_completed: u64,
    pub calls_failed: u64,
    pub calls_timed_out: u64,
    pub calls_rejected_busy: u64,
    pub unknown_responses: u64,
    pub malformed_frames: u64,
    pub pending: usize,
    pub connected: bool,
}

#[derive(Default)]
struct RpcCounters {
    issued: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    rejected_busy: AtomicU64,
    unknown: AtomicU64,
    malformed: AtomicU64,
}

struct PendingCall {
    method: String,
    generation: u64,
    issued_at: Instant,
    tx: oneshot::Sender<Result<JsonValue, ExecutionError>>,
}

struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<WorkerRequest>,
}

struct RpcInner {
    config: RpcClientConfig,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
    connection: Mutex<Option<Connection>>,
    counters: RpcCounters,
}

/// Correlating client for the worker wire protocol
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<RpcInner>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Self {
        Self {
            inner: Arc::new(RpcInner {
                config,
                next_id: AtomicU64::new(1),
                next_generation: AtomicU64::new(0),
                pending: Mutex::new(HashMap::new()),
                connection: Mutex::new(None),
                counters: RpcCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.inner.config
    }

    /// Start serving calls over a new transport.
    ///
    /// Any previously attached transport is detached and its pending calls fail.
    /// Returns the generation number of the new attachment.
    pub fn attach<R, W>(&self, reader: FrameReader<R>, writer: FrameWriter<W>) -> u64
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let previous = self
            .inner
            .connection()
            .replace(Connection { generation, outbound });
        if let Some(previous) = previous {
            self.inner
                .fail_generation(previous.generation, "worker transport replaced");
        }

        tokio::spawn(write_loop(Arc::clone(&self.inner), generation, writer, outbound_rx));
        tokio::spawn(read_loop(Arc::clone(&self.inner), generation, reader));

        debug!(generation, "Attached worker transport");
        generation
    }

    /// Issue one call and wait for its response.
    ///
    /// Settles exactly once: with the worker's result, the worker's error, a
    /// timeout, or [`ExecutionError::WorkerUnavailable`] if the transport closes
    /// first. A timed-out call is forgotten locally; the worker is not told.
    pub async fn call(
        &self,
        method: &str,
        params: JsonValue,
        timeout: Option<Duration>,
    ) -> Result<JsonValue, ExecutionError> {
        let timeout = timeout.unwrap_or(self.inner.config.default_timeout);

        let (generation, outbound) = self
            .inner
            .connection()
            .as_ref()
            .map(|c| (c.generation, c.outbound.clone()))
            .ok_or_else(|| {
                ExecutionError::WorkerUnavailable("no worker transport attached".to_string())
            })?;

        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.inner.pending();
            if let Some(limit) = self.inner.config.max_pending_calls {
                if pending.len() >= limit {
                    self.inner.counters.rejected_busy.fetch_add(1, Ordering::Relaxed);
                    warn!(method, limit, "Rejecting worker call: too many pending calls");
                    return Err(ExecutionError::WorkerBusy { limit });
                }
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            pending.insert(
                id,
                PendingCall {
                    method: method.to_string(),
                    generation,
                    issued_at: Instant::now(),
                    tx,
                },
            );
            id
        };
        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };

        // The transport may have closed between the lookup and the insert
        if !self.inner.is_current(generation) {
            return Err(ExecutionError::WorkerUnavailable(
                "worker transport closed".to_string(),
            ));
        }

        self.inner.counters.issued.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = id, method, "Sending worker request");

        if outbound.send(WorkerRequest::new(id, method, params)).is_err() {
            return Err(ExecutionError::WorkerUnavailable(
                "worker transport closed".to_string(),
            ));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ExecutionError::WorkerUnavailable(
                "call abandoned by transport".to_string(),
            )),
            Err(_) => {
                self.inner.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!(
                    request_id = id,
                    method,
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker call timed out"
                );
                Err(ExecutionError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Detach the transport, closing the worker's input and failing every pending call
    pub fn close(&self) {
        let connection = self.inner.connection().take();
        if let Some(connection) = connection {
            info!(generation = connection.generation, "Closing worker transport");
            self.inner
                .fail_generation(connection.generation, "worker client closed");
        }
    }

    /// Detach the transport of `generation`, if still attached, and fail its pending calls
    /// with [`ExecutionError::WorkerUnavailable`]
    pub fn fail_generation(&self, generation: u64, reason: &str) {
        self.inner.fail_generation(generation, reason);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection().is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn stats(&self) -> RpcStats {
        let counters = &self.inner.counters;
        RpcStats {
            calls_issued: counters.issued.load(Ordering::Relaxed),
            calls_completed: counters.completed.load(Ordering::Relaxed),
            calls_failed: counters.failed.load(Ordering::Relaxed),
            calls_timed_out: counters.timed_out.load(Ordering::Relaxed),
            calls_rejected_busy: counters.rejected_busy.load(Ordering::Relaxed),
            unknown_responses: counters.unknown.load(Ordering::Relaxed),
            malformed_frames: counters.malformed.load(Ordering::Relaxed),
            pending: self.pending_count(),
            connected: self.is_connected(),
        }
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(RpcClientConfig::default())
    }
}

impl RpcInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection()
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    /// Deliver one response to the call waiting on its id
    fn dispatch(&self, generation: u64, response: WorkerResponse) {
        let Some(id) = response.request_id() else {
            self.counters.unknown.fetch_add(1, Ordering::Relaxed);
            warn!(generation, id = ?response.id, "Dropping worker response without a usable id");
            return;
        };

        let call = self.pending().remove(&id);
        let Some(call) = call else {
            self.counters.unknown.fetch_add(1, Ordering::Relaxed);
            warn!(request_id = id, generation, "Dropping worker response for unknown request id");
            return;
        };

        let outcome = response.into_outcome().map_err(ExecutionError::WorkerError);
        if outcome.is_ok() {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            request_id = id,
            method = %call.method,
            elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Worker response received"
        );

        // The caller may have given up already
        let _ = call.tx.send(outcome);
    }

    /// Forget a transport and fail every call that was issued on it
    fn fail_generation(&self, generation: u64, reason: &str) {
        {
            let mut connection = self.connection();
            if connection
                .as_ref()
                .is_some_and(|c| c.generation == generation)
            {
                *connection = None;
            }
        }

        let failed: Vec<(RequestId, PendingCall)> = {
            let mut pending = self.pending();
            let ids: Vec<RequestId> = pending
                .iter()
                .filter(|(_, call)| call.generation == generation)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|call| (id, call)))
                .collect()
        };

        if !failed.is_empty() {
            warn!(
                generation,
                count = failed.len(),
                reason,
                "Failing pending worker calls"
            );
        }

        for (id, call) in failed {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = id, method = %call.method, "Worker call failed: transport closed");
            let _ = call
                .tx
                .send(Err(ExecutionError::WorkerUnavailable(reason.to_string())));
        }
    }
}

/// Removes a call's pending slot when its caller stops waiting
struct PendingGuard<'a> {
    inner: &'a RpcInner,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending().remove(&self.id);
    }
}

async fn write_loop<W>(
    inner: Arc<RpcInner>,
    generation: u64,
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::UnboundedReceiver<WorkerRequest>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = outbound.recv().await {
        if let Err(e) = writer.write_message(&request).await {
            warn!(generation, request_id = request.id, error = %e, "Failed to write request to worker");
            inner.fail_generation(generation, &format!("failed to write to worker: {}", e));
            return;
        }
    }

    // Every sender is gone: tell the worker there is no more input
    if let Err(e) = writer.shutdown().await {
        debug!(generation, error = %e, "Error closing worker input");
    }
}

async fn read_loop<R>(inner: Arc<RpcInner>, generation: u64, mut reader: FrameReader<R>)
where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        match reader.read_message::<WorkerResponse>().await {
            Ok(Some(response)) => inner.dispatch(generation, response),
            Ok(None) => break "worker closed its output".to_string(),
            Err(e) if e.is_fatal() => break format!("worker transport failed: {}", e),
            Err(e) => {
                inner.counters.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(generation, error = %e, "Dropping malformed frame from worker");
            }
        }
    };

    debug!(generation, reason = %reason, "Worker transport reader finished");
    inner.fail_generation(generation, &reason);
}
