//! Core backend trait

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::ExecutionError;

/// Something that can run canonical worker methods.
///
/// The MCP layer depends on this trait rather than on the process bridge so
/// that it can be driven by an in-process double in tests.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    /// Run one canonical method; `None` uses the backend's default timeout
    async fn call(
        &self,
        method: &str,
        params: JsonValue,
        timeout: Option<Duration>,
    ) -> Result<JsonValue, ExecutionError>;

    /// Check if the backend can currently accept calls
    async fn health_check(&self) -> Result<(), ExecutionError>;

    /// Stop the backend, waiting at most `grace` for a cooperative exit
    async fn shutdown(&self, grace: Duration) -> Result<(), ExecutionError>;
}
