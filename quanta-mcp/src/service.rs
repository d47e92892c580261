//! Tool dispatch: normalize, check capability, call the worker, materialize, record

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use quanta_config::{ArtifactsConfig, ToolsConfig};
use quanta_execution::{ExecutionError, WorkerBackend};
use quanta_storage::{BackgroundRecorder, PersistenceManager, DEFAULT_QUEUE_CAPACITY};

use crate::artifacts::ArtifactMaterializer;
use crate::protocol::{ToolsCallParams, ToolsCallResult, ToolsListResult};
use crate::router::{CapabilityRegistry, RoutingError, ToolCatalog, ToolInvocation};

/// Argument carrying a per-call timeout; never forwarded to the worker
pub const TIMEOUT_ARGUMENT: &str = "timeout_ms";

/// Everything a `tools/call` needs, shared by all in-flight requests
pub struct ToolService {
    catalog: ToolCatalog,
    capabilities: CapabilityRegistry,
    backend: Arc<dyn WorkerBackend>,
    persistence: PersistenceManager,
    recorder: BackgroundRecorder,
    materializer: ArtifactMaterializer,
    tools: ToolsConfig,
}

impl ToolService {
    /// Must be called from within a tokio runtime; it starts the persistence queue.
    pub fn new(
        tools: ToolsConfig,
        artifacts: &ArtifactsConfig,
        backend: Arc<dyn WorkerBackend>,
        persistence: PersistenceManager,
    ) -> Self {
        let catalog = ToolCatalog::from_config(&tools);
        let capabilities = CapabilityRegistry::from_config(&catalog, &tools);
        let unavailable = capabilities.unavailable();
        if !unavailable.is_empty() {
            info!("Tool families marked unavailable: {}", unavailable.join(", "));
        }
        let recorder = BackgroundRecorder::spawn(persistence.clone(), DEFAULT_QUEUE_CAPACITY);
        let materializer = ArtifactMaterializer::new(artifacts, recorder.clone());

        Self {
            catalog,
            capabilities,
            backend,
            persistence,
            recorder,
            materializer,
            tools,
        }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn persistence(&self) -> &PersistenceManager {
        &self.persistence
    }

    pub fn backend(&self) -> &Arc<dyn WorkerBackend> {
        &self.backend
    }

    /// Wait for queued events and artifacts to reach the store
    pub async fn flush_persistence(&self) {
        self.recorder.flush().await;
    }

    pub fn list_tools(&self) -> ToolsListResult {
        ToolsListResult {
            tools: self.catalog.list_tools(),
            next_cursor: None,
        }
    }

    /// Normalize a call and check that its family is served
    pub fn route(&self, name: &str, arguments: &Value) -> Result<ToolInvocation, RoutingError> {
        let invocation = self.catalog.normalize(name, arguments)?;
        if !self.capabilities.is_available(&invocation.family) {
            return Err(RoutingError::FamilyUnavailable {
                family: invocation.family,
            });
        }
        Ok(invocation)
    }

    /// Handle one `tools/call`.
    ///
    /// Never fails at the protocol level: routing, worker and transport
    /// problems all come back as an `isError` result carrying the session id.
    /// Calls that reached the worker are recorded as events; calls rejected
    /// by the router are not. Recording happens in the background, so the
    /// result never waits on the store.
    pub async fn call_tool(&self, params: ToolsCallParams) -> ToolsCallResult {
        let session_id = self
            .persistence
            .ensure_session(params.session_id.as_deref())
            .await;
        let arguments = params.arguments.unwrap_or(Value::Null);

        let mut invocation = match self.route(&params.name, &arguments) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!("Rejected call to '{}': {}", params.name, e);
                return routing_failure(&e, session_id);
            }
        };
        let timeout = match self.take_timeout(&mut invocation) {
            Ok(timeout) => timeout,
            Err(e) => {
                warn!("Rejected call to '{}': {}", params.name, e);
                return routing_failure(&e, session_id);
            }
        };

        debug!(
            "Calling {} for tool '{}' in session {} (timeout {}ms)",
            invocation.normalized_method,
            invocation.raw_name,
            session_id,
            timeout.as_millis()
        );
        let started = Instant::now();
        let outcome = self
            .backend
            .call(
                &invocation.normalized_method,
                invocation.normalized_params.clone(),
                Some(timeout),
            )
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                let (output, artifacts) = self
                    .materializer
                    .materialize(&session_id, &invocation.raw_name, result)
                    .await;
                self.recorder
                    .record_event(&session_id, &invocation.raw_name, &invocation.raw_params, &output);

                info!(
                    "{} completed in {}ms with {} artifact(s)",
                    invocation.normalized_method,
                    elapsed.as_millis(),
                    artifacts.len()
                );
                ToolsCallResult::text(render(&output), session_id)
            }
            Err(e) => {
                warn!(
                    "{} failed after {}ms: {}",
                    invocation.normalized_method,
                    elapsed.as_millis(),
                    e
                );
                let error = execution_error_payload(&e);
                let output = json!({ "error": error });
                self.recorder
                    .record_event(&session_id, &invocation.raw_name, &invocation.raw_params, &output);

                ToolsCallResult::error(e.to_string(), session_id).with_metadata("error", error)
            }
        }
    }

    /// Remove `timeout_ms` from the forwarded params and pick the timeout to use
    fn take_timeout(&self, invocation: &mut ToolInvocation) -> Result<Duration, RoutingError> {
        let requested = invocation
            .normalized_params
            .as_object_mut()
            .and_then(|map| map.remove(TIMEOUT_ARGUMENT))
            .filter(|v| !v.is_null());

        let Some(requested) = requested else {
            return Ok(self.tools.timeout_for(&invocation.family));
        };

        match requested.as_u64() {
            Some(ms) if ms > 0 => Ok(self.tools.clamp_timeout(Duration::from_millis(ms))),
            _ => Err(RoutingError::InvalidArguments {
                tool: invocation.raw_name.clone(),
                reason: format!("'{}' must be a positive integer, got {}", TIMEOUT_ARGUMENT, requested),
            }),
        }
    }
}

fn render(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn routing_failure(err: &RoutingError, session_id: String) -> ToolsCallResult {
    ToolsCallResult::error(err.to_string(), session_id).with_metadata(
        "error",
        json!({
            "kind": err.kind(),
            "message": err.to_string(),
        }),
    )
}

/// Error object forwarded to the caller and stored as the event output
fn execution_error_payload(err: &ExecutionError) -> Value {
    let mut payload = json!({
        "kind": err.kind(),
        "message": err.to_string(),
    });
    if let ExecutionError::WorkerError(worker) = err {
        payload["message"] = json!(worker.message);
        if let Some(code) = worker.code {
            payload["code"] = json!(code);
        }
        if let Some(data) = &worker.data {
            payload["data"] = data.clone();
        }
    }
    payload
}
