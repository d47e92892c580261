//! Domain-specific configuration modules

pub mod artifacts;
pub mod database;
pub mod logging;
pub mod server;
pub mod tools;
pub mod utils;
pub mod worker;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Quanta configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuantaConfig {
    /// Computation worker process
    #[serde(default)]
    pub worker: worker::WorkerConfig,

    /// Session store
    #[serde(default)]
    pub database: database::DatabaseConfig,

    /// Artifact files
    #[serde(default)]
    pub artifacts: artifacts::ArtifactsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,

    /// Tool routing
    #[serde(default)]
    pub tools: tools::ToolsConfig,

    /// MCP server identity and limits
    #[serde(default)]
    pub server: server::ServerConfig,
}

impl QuantaConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.worker.validate()?;
        self.database.validate()?;
        self.artifacts.validate()?;
        self.logging.validate()?;
        self.tools.validate()?;
        self.server.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = QuantaConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(QuantaConfig::default().validate_all().is_ok());
    }

    #[test]
    fn test_sample_parses_back() {
        let sample = QuantaConfig::generate_sample();
        let parsed: QuantaConfig = serde_yaml::from_str(&sample).unwrap();
        assert!(parsed.validate_all().is_ok());
        assert_eq!(parsed.worker.command, "python3");
        assert_eq!(parsed.tools.timeout_for("data").as_secs(), 300);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
worker:
  command: /opt/venv/bin/python
  args: ["-u", "worker.py"]
tools:
  unavailable_families: [quantum]
"#;
        let config: QuantaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.worker.command, "/opt/venv/bin/python");
        assert_eq!(config.worker.max_restart_attempts, 3);
        assert_eq!(config.tools.unavailable_families, vec!["quantum".to_string()]);
        assert_eq!(config.database.url, "sqlite://quanta.db");
    }
}
