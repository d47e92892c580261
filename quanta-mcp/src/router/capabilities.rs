use std::collections::BTreeMap;

use quanta_config::ToolsConfig;

use super::catalog::ToolCatalog;

/// Which tool families the worker can actually serve
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    families: BTreeMap<String, bool>,
}

impl CapabilityRegistry {
    /// Every family in the catalog starts available
    pub fn new(catalog: &ToolCatalog) -> Self {
        let families = catalog
            .family_names()
            .into_iter()
            .map(|name| (name, true))
            .collect();
        Self { families }
    }

    pub fn from_config(catalog: &ToolCatalog, config: &ToolsConfig) -> Self {
        let mut registry = Self::new(catalog);
        for family in &config.unavailable_families {
            registry.set_available(family, false);
        }
        registry
    }

    /// Families the registry has never heard of are assumed available
    pub fn is_available(&self, family: &str) -> bool {
        self.families.get(family).copied().unwrap_or(true)
    }

    pub fn set_available(&mut self, family: &str, available: bool) {
        self.families.insert(family.to_string(), available);
    }

    pub fn unavailable(&self) -> Vec<&str> {
        self.families
            .iter()
            .filter(|(_, available)| !**available)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
