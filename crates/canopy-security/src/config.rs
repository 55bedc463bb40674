//! Access control provider configuration

use serde::{Deserialize, Serialize};

use crate::collector::DEFAULT_ENTRIES_CACHE_CAPACITY;
use crate::compiled::{DEFAULT_READ_CACHE_CAPACITY, DEFAULT_RESULT_CACHE_CAPACITY};
use crate::error::{Error, Result};

/// Settings of an [`AccessControlProvider`](crate::AccessControlProvider)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Skip installing the default root policy on init
    pub omit_default_permission: bool,
    /// Entry lists kept by the shared collector
    pub entries_cache_capacity: usize,
    /// Results kept per compiled permissions instance
    pub result_cache_capacity: usize,
    /// Read checks kept per compiled permissions instance
    pub read_cache_capacity: usize,
    /// Group granted `jcr:all` by the default root policy
    pub administrators_principal: String,
    /// Group granted `jcr:read` by the default root policy
    pub everyone_principal: String,
}

impl ProviderConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ProviderConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize to TOML: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("entries_cache_capacity", self.entries_cache_capacity),
            ("result_cache_capacity", self.result_cache_capacity),
            ("read_cache_capacity", self.read_cache_capacity),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, capacity)| *capacity == 0) {
            return Err(Error::Config(format!("{} must be greater than zero", name)));
        }
        if self.everyone_principal.is_empty() {
            return Err(Error::Config("everyone_principal must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            omit_default_permission: false,
            entries_cache_capacity: DEFAULT_ENTRIES_CACHE_CAPACITY,
            result_cache_capacity: DEFAULT_RESULT_CACHE_CAPACITY,
            read_cache_capacity: DEFAULT_READ_CACHE_CAPACITY,
            administrators_principal: "administrators".to_string(),
            everyone_principal: "everyone".to_string(),
        }
    }
}
