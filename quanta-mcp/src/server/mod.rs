//! MCP server over newline-delimited stdio
//!
//! The reader loop hands each frame to its own task, bounded by
//! `server.max_concurrent_requests`. Responses are funnelled through a single
//! writer task, so a slow worker call never blocks replies to other requests
//! and frames are never interleaved on the output stream.

pub mod handler;

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use quanta_config::ServerConfig;
use quanta_ipc::{FrameReader, FrameWriter};

use crate::error::{McpError, McpResult};
use crate::protocol::JsonRpcResponse;
use crate::service::ToolService;

pub use handler::McpRequestHandler;

/// MCP server bound to one [`ToolService`]
pub struct McpServer {
    handler: Arc<McpRequestHandler>,
    config: ServerConfig,
}

impl McpServer {
    pub fn new(service: Arc<ToolService>, config: ServerConfig) -> Self {
        Self {
            handler: Arc::new(McpRequestHandler::new(service, config.clone())),
            config,
        }
    }

    pub fn handler(&self) -> &Arc<McpRequestHandler> {
        &self.handler
    }

    /// Handle a single raw message; `None` for notifications
    pub async fn handle_message(&self, message: &[u8]) -> Option<JsonRpcResponse> {
        self.handler.handle_message(message).await
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn run_stdio(&self) -> McpResult<()> {
        tracing::info!("Starting MCP server with stdio transport");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve requests read from `reader`, writing responses to `writer`.
    ///
    /// Returns once the input ends and every accepted request has been answered.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> McpResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut frames = FrameReader::new(reader);
        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_requests.max(1)));
        let mut tasks = JoinSet::new();
        let mut request_count: u64 = 0;
        let mut read_error = None;

        loop {
            let frame = match frames.read_frame().await {
                Ok(Some(frame)) => frame.to_vec(),
                Ok(None) => {
                    tracing::info!("Received EOF on stdin, shutting down MCP server");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading MCP input: {}", e);
                    read_error = Some(McpError::from(e));
                    break;
                }
            };

            request_count += 1;
            tracing::debug!(
                "Received MCP request #{} ({} bytes)",
                request_count,
                frame.len()
            );

            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| McpError::internal(e.to_string()))?;
            let handler = self.handler.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                if let Some(response) = handler.handle_message(&frame).await {
                    // The writer only goes away when output is closed
                    let _ = tx.send(response);
                }
                drop(permit);
            });

            while let Some(finished) = tasks.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!("MCP request task failed: {}", e);
                }
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::error!("MCP request task failed: {}", e);
            }
        }
        drop(tx);
        writer_task
            .await
            .map_err(|e| McpError::internal(format!("response writer failed: {}", e)))?;

        tracing::info!(
            "MCP server loop terminated after {} requests",
            request_count
        );
        match read_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn write_responses<W>(writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = FrameWriter::new(writer);
    while let Some(response) = rx.recv().await {
        if let Err(e) = writer.write_message(&response).await {
            tracing::error!("Failed to write MCP response: {}", e);
            break;
        }
    }
}
