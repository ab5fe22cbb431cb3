//! Working-memory configuration

use serde::{Deserialize, Serialize};

/// Settings for the working-memory cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Cache capacity; the oldest entry is evicted when full
    pub max_entries: usize,
    /// Default time-to-live in seconds for entries stored without an explicit
    /// TTL. `None` means entries never expire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ttl_secs: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_secs: Some(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.default_ttl_secs, Some(300));
    }

    #[test]
    fn test_memory_config_from_toml() {
        let toml = "max_entries = 50";
        let config: MemoryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.default_ttl_secs, Some(300));
    }
}
