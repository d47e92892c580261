//! Tool routing configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, Validatable};

/// Timeouts, availability and catalog extensions for the tool router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Timeout for a worker call when nothing more specific applies
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_timeout")]
    pub default_timeout: Duration,

    /// Ceiling for caller-supplied `timeout_ms` values
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_max_timeout")]
    pub max_timeout: Duration,

    /// Per-family timeout overrides, in seconds
    #[serde(default)]
    pub family_timeouts: BTreeMap<String, u64>,

    /// Families whose worker-side support is not installed
    #[serde(default)]
    pub unavailable_families: Vec<String>,

    /// Additional consolidated families, or replacements for built-in ones
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub families: Vec<FamilyDefinition>,

    /// Additional standalone legacy names mapped to canonical methods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub legacy_names: BTreeMap<String, String>,
}

/// A consolidated tool family declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyDefinition {
    /// Outward tool name
    pub name: String,

    /// Canonical method prefix; defaults to the family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Other outward names for the same family
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Methods selectable through the `method` field
    pub methods: Vec<String>,

    /// Tool description shown to clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ToolsConfig {
    /// Timeout applied to calls routed to `family`
    pub fn timeout_for(&self, family: &str) -> Duration {
        self.family_timeouts
            .get(family)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(self.default_timeout)
    }

    /// Clamp a caller-requested timeout to the configured ceiling
    pub fn clamp_timeout(&self, requested: Duration) -> Duration {
        requested.min(self.max_timeout)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_timeout(),
            max_timeout: default_max_timeout(),
            family_timeouts: default_family_timeouts(),
            unavailable_families: Vec::new(),
            families: Vec::new(),
            legacy_names: BTreeMap::new(),
        }
    }
}

impl Validatable for ToolsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.default_timeout.as_secs(),
            "default_timeout",
            self.domain_name(),
        )?;

        if self.max_timeout < self.default_timeout {
            return Err(self.validation_error(format!(
                "max_timeout ({}s) must not be shorter than default_timeout ({}s)",
                self.max_timeout.as_secs(),
                self.default_timeout.as_secs()
            )));
        }

        for (family, secs) in &self.family_timeouts {
            validate_positive(*secs, &format!("family_timeouts.{}", family), self.domain_name())?;
        }

        for family in &self.families {
            family.validate()?;
        }

        for (name, method) in &self.legacy_names {
            validate_required_string(name, "legacy_names key", self.domain_name())?;
            validate_required_string(method, &format!("legacy_names.{}", name), self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "tools"
    }
}

impl Validatable for FamilyDefinition {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;

        if self.methods.is_empty() {
            return Err(self.validation_error(format!(
                "family '{}' must declare at least one method",
                self.name
            )));
        }

        for method in &self.methods {
            let well_formed = !method.is_empty()
                && method
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !well_formed {
                return Err(self.validation_error(format!(
                    "family '{}' has malformed method '{}'",
                    self.name, method
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "tools.families"
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_family_timeouts() -> BTreeMap<String, u64> {
    BTreeMap::from([
        ("plot".to_string(), 120),
        ("data".to_string(), 300),
        ("api".to_string(), 60),
    ])
}
