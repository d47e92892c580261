//! Inter-process communication for Quanta
//!
//! This crate provides the wire protocol spoken with the computation worker and
//! the newline-delimited framing used to carry it over the worker's stdio pipes.

pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use protocol::{RequestId, WorkerError, WorkerRequest, WorkerResponse};
pub use transport::{ChildProcessTransport, FrameReader, FrameWriter};
