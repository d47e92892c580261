//! Computation worker process configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Worker process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Program used to launch the worker
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments passed to the worker program
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Working directory for the worker process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables for the worker process
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Restart the worker on the next call after it crashes
    #[serde(default = "crate::domains::utils::default_true")]
    pub restart_on_crash: bool,

    /// Restart attempts allowed before giving up
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// Pause before each restart
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_restart_delay")]
    pub restart_delay: Duration,

    /// A worker that stayed up this long before crashing gets a fresh restart budget
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_restart_window")]
    pub restart_window: Duration,

    /// Time the worker gets to exit after its input is closed
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,

    /// Upper bound on concurrently pending calls; `None` means unbounded
    #[serde(default = "default_max_pending_calls")]
    pub max_pending_calls: Option<usize>,

    /// Upper bound on a single response frame in bytes; `None` means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_frame_bytes: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            working_dir: None,
            env: HashMap::new(),
            restart_on_crash: true,
            max_restart_attempts: default_max_restart_attempts(),
            restart_delay: default_restart_delay(),
            restart_window: default_restart_window(),
            shutdown_grace: default_shutdown_grace(),
            max_pending_calls: default_max_pending_calls(),
            max_frame_bytes: None,
        }
    }
}

impl Validatable for WorkerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.command, "command", self.domain_name())?;

        validate_positive(
            self.shutdown_grace.as_secs(),
            "shutdown_grace",
            self.domain_name(),
        )?;

        if let Some(limit) = self.max_pending_calls {
            validate_positive(limit, "max_pending_calls", self.domain_name())?;
        }

        if let Some(limit) = self.max_frame_bytes {
            if limit < 1024 {
                return Err(self.validation_error(format!(
                    "max_frame_bytes must be at least 1024, got {}",
                    limit
                )));
            }
        }

        if let Some(dir) = &self.working_dir {
            if dir.as_os_str().is_empty() {
                return Err(self.validation_error("working_dir cannot be empty when set"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "worker"
    }
}

// Default value functions
fn default_command() -> String {
    "python3".to_string()
}

fn default_args() -> Vec<String> {
    vec!["worker.py".to_string()]
}

fn default_max_restart_attempts() -> u32 {
    3
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_restart_window() -> Duration {
    Duration::from_secs(60)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_max_pending_calls() -> Option<usize> {
    Some(256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.command, "python3");
        assert_eq!(config.max_pending_calls, Some(256));
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = WorkerConfig {
            command: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_pending_limit_rejected() {
        let config = WorkerConfig {
            max_pending_calls: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let unbounded = WorkerConfig {
            max_pending_calls: None,
            ..Default::default()
        };
        assert!(unbounded.validate().is_ok());
    }
}
