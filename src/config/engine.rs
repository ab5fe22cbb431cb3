//! Rules-engine configuration

use serde::{Deserialize, Serialize};

use crate::scoring::AggregationMethod;

/// Settings for the rules engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum confidence below which a decision should be escalated
    pub confidence_threshold: f64,
    /// Fallback destination when no rule matches. `None` makes an unmatched
    /// task a routing error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_destination: Option<String>,
    /// How per-destination rule scores combine into one confidence
    pub aggregation: AggregationMethod,
    /// Bound on the decision history ring
    pub max_history: usize,
    /// Feedback samples a rule needs before its quality is reported
    pub min_samples: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            default_destination: None,
            aggregation: AggregationMethod::default(),
            max_history: 1000,
            min_samples: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.confidence_threshold, 0.7);
        assert!(config.default_destination.is_none());
        assert_eq!(config.aggregation, AggregationMethod::Max);
        assert_eq!(config.max_history, 1000);
        assert_eq!(config.min_samples, 5);
    }

    #[test]
    fn test_engine_config_from_toml() {
        let toml = r#"
            confidence_threshold = 0.8
            default_destination = "triage"
            aggregation = "weighted_avg"
        "#;
        let config: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.default_destination.as_deref(), Some("triage"));
        assert_eq!(config.aggregation, AggregationMethod::WeightedAvg);
        // Unspecified fields keep defaults
        assert_eq!(config.max_history, 1000);
    }
}
