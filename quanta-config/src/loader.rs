//! Configuration loading and environment variable handling

use crate::domains::QuantaConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "QUANTA".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<QuantaConfig> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: QuantaConfig = if content.trim().is_empty() {
            QuantaConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<QuantaConfig> {
        let mut config = QuantaConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<QuantaConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut QuantaConfig) -> ConfigResult<()> {
        self.apply_worker_overrides(&mut config.worker)?;
        self.apply_database_overrides(&mut config.database)?;
        self.apply_artifact_overrides(&mut config.artifacts);
        self.apply_logging_overrides(&mut config.logging)?;
        self.apply_tools_overrides(&mut config.tools)?;
        Ok(())
    }

    fn apply_worker_overrides(
        &self,
        config: &mut crate::domains::worker::WorkerConfig,
    ) -> ConfigResult<()> {
        if let Ok(command) = self.get_env_var("WORKER_COMMAND") {
            config.command = command;
        }

        if let Ok(args) = self.get_env_var("WORKER_ARGS") {
            config.args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(dir) = self.get_env_var("WORKER_DIR") {
            config.working_dir = Some(PathBuf::from(dir));
        }

        if let Ok(restart) = self.get_env_var("WORKER_RESTART_ON_CRASH") {
            config.restart_on_crash = self.parse_var("WORKER_RESTART_ON_CRASH", &restart)?;
        }

        if let Ok(limit) = self.get_env_var("MAX_PENDING_CALLS") {
            let limit: usize = self.parse_var("MAX_PENDING_CALLS", &limit)?;
            config.max_pending_calls = (limit > 0).then_some(limit);
        }

        Ok(())
    }

    fn apply_database_overrides(
        &self,
        config: &mut crate::domains::database::DatabaseConfig,
    ) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("DATABASE_URL") {
            config.url = url;
        }

        if let Ok(enabled) = self.get_env_var("DATABASE_ENABLED") {
            config.enabled = self.parse_var("DATABASE_ENABLED", &enabled)?;
        }

        Ok(())
    }

    fn apply_artifact_overrides(&self, config: &mut crate::domains::artifacts::ArtifactsConfig) {
        if let Ok(dir) = self.get_env_var("ARTIFACTS_DIR") {
            config.root = PathBuf::from(dir);
        }
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    fn apply_tools_overrides(
        &self,
        config: &mut crate::domains::tools::ToolsConfig,
    ) -> ConfigResult<()> {
        if let Ok(timeout) = self.get_env_var("WORKER_TIMEOUT_SECONDS") {
            let seconds: u64 = self.parse_var("WORKER_TIMEOUT_SECONDS", &timeout)?;
            config.default_timeout = Duration::from_secs(seconds);
        }

        if let Ok(families) = self.get_env_var("UNAVAILABLE_FAMILIES") {
            config.unavailable_families = families
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    fn parse_var<T>(&self, name: &str, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value
            .trim()
            .parse()
            .map_err(|e| ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e)))
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker:\n  command: python3.12\ndatabase:\n  url: sqlite://from-file.db").unwrap();

        temp_env::with_vars(
            [
                ("QUANTA_DATABASE_URL", Some("sqlite://from-env.db")),
                ("QUANTA_WORKER_TIMEOUT_SECONDS", Some("45")),
            ],
            || {
                let config = ConfigLoader::new().from_file(file.path()).unwrap();
                assert_eq!(config.worker.command, "python3.12");
                assert_eq!(config.database.url, "sqlite://from-env.db");
                assert_eq!(config.tools.default_timeout, Duration::from_secs(45));
            },
        );
    }

    #[test]
    fn test_invalid_env_value_reports_variable() {
        temp_env::with_var("TESTQ_MAX_PENDING_CALLS", Some("lots"), || {
            let err = ConfigLoader::with_prefix("TESTQ").from_env().unwrap_err();
            assert!(err.to_string().contains("TESTQ_MAX_PENDING_CALLS"));
        });
    }

    #[test]
    fn test_zero_pending_limit_means_unbounded() {
        temp_env::with_var("TESTZ_MAX_PENDING_CALLS", Some("0"), || {
            let config = ConfigLoader::with_prefix("TESTZ").from_env().unwrap();
            assert_eq!(config.worker.max_pending_calls, None);
        });
    }

    #[test]
    fn test_unavailable_families_from_env() {
        temp_env::with_var("TESTU_UNAVAILABLE_FAMILIES", Some("quantum, data ,"), || {
            let config = ConfigLoader::with_prefix("TESTU").from_env().unwrap();
            assert_eq!(
                config.tools.unavailable_families,
                vec!["quantum".to_string(), "data".to_string()]
            );
        });
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = ConfigLoader::with_prefix("TESTE").from_file(file.path()).unwrap();
        assert_eq!(config.server.name, "quanta");
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker: [unclosed").unwrap();
        let err = ConfigLoader::with_prefix("TESTP").from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
