//! Error types for MCP operations

use std::time::Duration;
use thiserror::Error;

use crate::router::RoutingError;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Error type for the MCP surface
#[derive(Error, Debug)]
pub enum McpError {
    /// Transport-level errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Invalid JSON-RPC message
    #[error("Invalid JSON-RPC message: {details}")]
    InvalidJsonRpc { details: String },

    /// MCP method not found
    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    /// Invalid method parameters
    #[error("Invalid parameters for method {method}: {details}")]
    InvalidParams { method: String, details: String },

    /// Tool name or method selector rejected by the router
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Server timeout
    #[error("Server timeout after {timeout:?}")]
    ServerTimeout { timeout: Duration },

    /// Server unavailable
    #[error("Server unavailable: {reason}")]
    ServerUnavailable { reason: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {details}")]
    Serialization { details: String },

    /// Internal server error
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl McpError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_params(method: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidParams {
            method: method.into(),
            details: details.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            McpError::ServerTimeout { .. }
            | McpError::ServerUnavailable { .. }
            | McpError::Transport { .. } => true,

            McpError::MethodNotFound { .. }
            | McpError::InvalidParams { .. }
            | McpError::InvalidJsonRpc { .. }
            | McpError::Routing(_)
            | McpError::Configuration { .. } => false,

            _ => false,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Serialization {
            details: err.to_string(),
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Transport {
            message: err.to_string(),
        }
    }
}

impl From<quanta_ipc::IpcError> for McpError {
    fn from(err: quanta_ipc::IpcError) -> Self {
        McpError::Transport {
            message: format!("IPC error: {}", err),
        }
    }
}

impl From<quanta_execution::ExecutionError> for McpError {
    fn from(err: quanta_execution::ExecutionError) -> Self {
        match err {
            quanta_execution::ExecutionError::Timeout { timeout, .. } => {
                McpError::ServerTimeout { timeout }
            }
            quanta_execution::ExecutionError::WorkerUnavailable(reason) => {
                McpError::ServerUnavailable { reason }
            }
            other => McpError::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<quanta_config::ConfigError> for McpError {
    fn from(err: quanta_config::ConfigError) -> Self {
        McpError::Configuration {
            message: err.to_string(),
        }
    }
}
