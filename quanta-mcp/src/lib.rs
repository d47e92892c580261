//! # Quanta MCP tool server
//!
//! Exposes the Quanta worker's computations as Model Context Protocol tools.
//!
//! ```text
//! ┌──────────────────┐
//! │   MCP client     │
//! └────────┬─────────┘
//!          │ JSON-RPC over stdio
//! ┌────────▼─────────┐
//! │  McpServer       │
//! │  ┌────────────┐  │
//! │  │ ToolService│──┼──► ToolCatalog / CapabilityRegistry
//! │  └─────┬──────┘  │
//! │        ├─────────┼──► ArtifactMaterializer ──► artifacts/<session>/
//! │        ├─────────┼──► BackgroundRecorder   ──► SQLite
//! └────────┼─────────┘
//!          │ newline-delimited JSON
//! ┌────────▼─────────┐
//! │  worker process  │
//! └──────────────────┘
//! ```
//!
//! Tool names follow two schemes at once: consolidated tools such as `cas`
//! select an operation with a `method` argument, while legacy names such as
//! `compute_evaluate` fix the operation in the name. Both normalize to the same
//! canonical worker method and params.

pub mod artifacts;
pub mod error;
pub mod protocol;
pub mod router;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use artifacts::{ArtifactMaterializer, MaterializedArtifact};
pub use error::{McpError, McpResult};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, Tool, ToolContent, ToolsCallParams,
    ToolsCallResult, ToolsListResult,
};
pub use router::{CapabilityRegistry, RoutingError, ToolCatalog, ToolInvocation};
pub use server::{McpRequestHandler, McpServer};
pub use service::ToolService;
