//! MCP protocol implementation: JSON-RPC 2.0 framing plus the MCP payloads the server speaks

pub mod jsonrpc;
pub mod messages;

pub use jsonrpc::{JsonRpcError, JsonRpcErrorCode, JsonRpcRequest, JsonRpcResponse};
pub use messages::{
    ClientInfo, InitializeParams, InitializeResult, ServerCapabilities, ServerInfo, Tool,
    ToolContent, ToolsCallParams, ToolsCallResult, ToolsCapability, ToolsListResult,
};

/// Protocol revision this server implements
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Revisions a client may negotiate
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Pick the revision to answer `initialize` with: the client's if we support it,
/// otherwise our own.
pub fn negotiate_protocol_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .copied()
        .find(|v| *v == requested)
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// Standard MCP methods handled by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardMethod {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
    Cancelled,
}

impl StandardMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "notifications/initialized" | "initialized" => Some(Self::Initialized),
            "ping" => Some(Self::Ping),
            "tools/list" => Some(Self::ToolsList),
            "tools/call" => Some(Self::ToolsCall),
            "notifications/cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}
