//! MCP server configuration

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Identity and limits of the MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name reported during initialization
    #[serde(default = "default_name")]
    pub name: String,

    /// Free-form usage notes reported during initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Requests handled concurrently before the reader stops accepting more
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            instructions: None,
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_positive(
            self.max_concurrent_requests,
            "max_concurrent_requests",
            self.domain_name(),
        )
    }

    fn domain_name(&self) -> &'static str {
        "server"
    }
}

fn default_name() -> String {
    "quanta".to_string()
}

fn default_max_concurrent_requests() -> usize {
    64
}
