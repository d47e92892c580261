//! Domain-driven configuration management for Quanta
//!
//! Configuration is split by functional domain (worker process, persistence,
//! artifacts, logging, tool routing, MCP server), each with its own defaults
//! and validation, loaded from YAML with environment variable overrides.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    artifacts::ArtifactsConfig,
    database::DatabaseConfig,
    logging::{FileLogConfig, LogFormat, LogLevel, LogRotation, LoggingConfig},
    server::ServerConfig,
    tools::{FamilyDefinition, ToolsConfig},
    worker::WorkerConfig,
    QuantaConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
