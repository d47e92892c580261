//! JSON-RPC request handling for the MCP surface

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use quanta_config::ServerConfig;

use crate::error::{McpError, McpResult};
use crate::protocol::{
    negotiate_protocol_version, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ServerCapabilities, ServerInfo, StandardMethod, ToolsCallParams,
    ToolsCapability,
};
use crate::service::ToolService;

/// Turns decoded requests into responses; shared by every request task
pub struct McpRequestHandler {
    service: Arc<ToolService>,
    config: ServerConfig,
    initialized: AtomicBool,
}

impl McpRequestHandler {
    pub fn new(service: Arc<ToolService>, config: ServerConfig) -> Self {
        Self {
            service,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn service(&self) -> &Arc<ToolService> {
        &self.service
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Handle one raw frame. Returns `None` for notifications.
    pub async fn handle_message(&self, message: &[u8]) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_slice(message) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Unparseable MCP message: {}", e);
                return Some(JsonRpcResponse::error(
                    JsonRpcError::parse_error(e.to_string()),
                    None,
                ));
            }
        };

        let id = value.get("id").cloned();
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("Invalid JSON-RPC request: {}", e);
                return Some(JsonRpcResponse::error(
                    JsonRpcError::invalid_request(e.to_string()),
                    id,
                ));
            }
        };

        self.handle_request(request).await
    }

    /// Handle a decoded JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            self.handle_notification(&request.method);
            return None;
        }

        let request_id = request.id.clone();
        match self.process_request(request).await {
            Ok(result) => Some(JsonRpcResponse::success(result, request_id)),
            Err(e) => {
                let json_rpc_error = match e {
                    McpError::MethodNotFound { method } => JsonRpcError::method_not_found(&method),
                    McpError::InvalidParams { details, .. } => JsonRpcError::invalid_params(details),
                    McpError::InvalidJsonRpc { details } => JsonRpcError::invalid_request(details),
                    McpError::Serialization { details } => JsonRpcError::invalid_params(details),
                    other => JsonRpcError::internal_error(other.to_string()),
                };
                Some(JsonRpcResponse::error(json_rpc_error, request_id))
            }
        }
    }

    async fn process_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let Some(method) = StandardMethod::parse(&request.method) else {
            return Err(McpError::MethodNotFound {
                method: request.method,
            });
        };

        match method {
            StandardMethod::Initialize => {
                let params: InitializeParams = match request.params {
                    Some(params) => serde_json::from_value(params)
                        .map_err(|e| McpError::invalid_params("initialize", e.to_string()))?,
                    None => serde_json::from_value(Value::Object(Default::default()))?,
                };
                Ok(serde_json::to_value(self.handle_initialize(params))?)
            }
            StandardMethod::Ping => Ok(Value::Object(Default::default())),
            StandardMethod::ToolsList => Ok(serde_json::to_value(self.service.list_tools())?),
            StandardMethod::ToolsCall => {
                let params: ToolsCallParams = request
                    .params
                    .ok_or_else(|| McpError::invalid_params("tools/call", "missing params"))
                    .and_then(|params| {
                        serde_json::from_value(params)
                            .map_err(|e| McpError::invalid_params("tools/call", e.to_string()))
                    })?;
                let result = self.service.call_tool(params).await;
                Ok(serde_json::to_value(result)?)
            }
            // Notifications sent with an id still get an empty answer
            StandardMethod::Initialized | StandardMethod::Cancelled => {
                self.handle_notification(&request.method);
                Ok(Value::Object(Default::default()))
            }
        }
    }

    fn handle_notification(&self, method: &str) {
        match StandardMethod::parse(method) {
            Some(StandardMethod::Initialized) => {
                if !self.initialized.swap(true, Ordering::AcqRel) {
                    tracing::info!("MCP client finished initialization");
                }
            }
            Some(StandardMethod::Cancelled) => {
                tracing::debug!("Received cancellation notification");
            }
            _ => {
                tracing::debug!("Ignoring notification '{}'", method);
            }
        }
    }

    fn handle_initialize(&self, params: InitializeParams) -> InitializeResult {
        let client = params
            .client_info
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or("unknown client");
        let protocol_version = negotiate_protocol_version(&params.protocol_version);
        tracing::info!(
            "Initializing MCP session with {} (protocol {})",
            client,
            protocol_version
        );

        InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: self.config.name.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: self.config.instructions.clone(),
        }
    }
}
