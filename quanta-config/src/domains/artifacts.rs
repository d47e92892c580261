//! Artifact storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::validation::Validatable;

/// Where and how embedded payloads are written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Write embedded payloads to disk
    #[serde(default = "crate::domains::utils::default_true")]
    pub enabled: bool,

    /// Root directory; each session gets its own subdirectory
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Remove embedded payloads from the result once they are on disk
    #[serde(default = "crate::domains::utils::default_false")]
    pub strip_payloads: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_root(),
            strip_payloads: false,
        }
    }
}

impl Validatable for ArtifactsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.root.as_os_str().is_empty() {
            return Err(self.validation_error("root cannot be empty"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "artifacts"
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("artifacts")
}
