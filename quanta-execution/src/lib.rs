//! Quanta execution engine
//!
//! Supervises the out-of-process computation worker and multiplexes
//! concurrent calls over its single stdio channel.

pub mod error;
pub mod executor;
pub mod process;
pub mod rpc;
pub mod worker;

// Re-export main types
pub use error::ExecutionError;
pub use executor::WorkerBackend;
pub use process::{BridgeStats, ProcessWorkerBridge, WorkerBridgeConfig};
pub use rpc::{RpcClient, RpcClientConfig, RpcStats};
pub use worker::{
    SupervisorConfig, WorkerExit, WorkerHandle, WorkerProcessStatus, WorkerStats, WorkerSupervisor,
};
