//! Structured logging for Quanta
//!
//! All console output goes to stderr: stdout carries the MCP protocol and
//! must never see a log line.

pub mod init;

pub use init::{init_logging_from_config, init_simple_tracing, LoggingGuard};
