//! Configuration module for Trellis
//!
//! Provides layered configuration loading from files, environment variables,
//! and defaults.
//!
//! # Configuration Precedence
//!
//! 1. Environment variables (`TRELLIS_*`)
//! 2. Configuration file (TOML)
//! 3. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use trellis::config::TrellisConfig;
//!
//! // Load defaults
//! let config = TrellisConfig::default();
//! assert_eq!(config.engine.confidence_threshold, 0.7);
//!
//! // Parse from TOML
//! let toml = r#"
//! [engine]
//! confidence_threshold = 0.85
//! "#;
//! let config: TrellisConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.engine.confidence_threshold, 0.85);
//! ```

pub mod engine;
pub mod error;
pub mod logging;
pub mod memory;

pub use engine::EngineConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use memory::MemoryConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for a Trellis deployment.
///
/// Aggregates the rules-engine, working-memory, and logging sections.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrellisConfig {
    /// Rules engine settings
    pub engine: EngineConfig,
    /// Working-memory cache settings
    pub memory: MemoryConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl TrellisConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports TRELLIS_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(threshold) = std::env::var("TRELLIS_CONFIDENCE_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.engine.confidence_threshold = t;
            }
        }
        if let Ok(destination) = std::env::var("TRELLIS_DEFAULT_DESTINATION") {
            self.engine.default_destination = Some(destination);
        }
        if let Ok(aggregation) = std::env::var("TRELLIS_AGGREGATION") {
            if let Ok(a) = aggregation.parse() {
                self.engine.aggregation = a;
            }
        }

        if let Ok(max_entries) = std::env::var("TRELLIS_MEMORY_MAX_ENTRIES") {
            if let Ok(m) = max_entries.parse() {
                self.memory.max_entries = m;
            }
        }
        if let Ok(ttl) = std::env::var("TRELLIS_MEMORY_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.memory.default_ttl_secs = Some(t);
            }
        }

        if let Ok(level) = std::env::var("TRELLIS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TRELLIS_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.engine.confidence_threshold) {
            return Err(ConfigError::Validation {
                field: "engine.confidence_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        if let Some(destination) = &self.engine.default_destination {
            if destination.is_empty() {
                return Err(ConfigError::Validation {
                    field: "engine.default_destination".to_string(),
                    message: "cannot be empty when set".to_string(),
                });
            }
        }
        if self.engine.max_history == 0 {
            return Err(ConfigError::Validation {
                field: "engine.max_history".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.memory.max_entries == 0 {
            return Err(ConfigError::Validation {
                field: "memory.max_entries".to_string(),
                message: "must be non-zero".to_string(),
            });
        }
        if self.memory.default_ttl_secs == Some(0) {
            return Err(ConfigError::Validation {
                field: "memory.default_ttl_secs".to_string(),
                message: "must be non-zero when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrellisConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let result = TrellisConfig::load(Some(Path::new("/nonexistent/trellis.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_none_returns_defaults() {
        let config = TrellisConfig::load(None).unwrap();
        assert_eq!(config.engine.confidence_threshold, 0.7);
        assert_eq!(config.memory.max_entries, 1000);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [engine]
            confidence_threshold = 0.6
            default_destination = "triage"
            aggregation = "noisy_or"
            max_history = 200
            min_samples = 10

            [memory]
            max_entries = 64
            default_ttl_secs = 60

            [logging]
            level = "debug"
            format = "json"
        "#;
        let config: TrellisConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.confidence_threshold, 0.6);
        assert_eq!(config.engine.default_destination.as_deref(), Some("triage"));
        assert_eq!(config.engine.max_history, 200);
        assert_eq!(config.engine.min_samples, 10);
        assert_eq!(config.memory.max_entries, 64);
        assert_eq!(config.memory.default_ttl_secs, Some(60));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = TrellisConfig::default();
        config.engine.confidence_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = TrellisConfig::default();
        config.memory.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_default_destination() {
        let mut config = TrellisConfig::default();
        config.engine.default_destination = Some(String::new());
        assert!(config.validate().is_err());
    }
}
