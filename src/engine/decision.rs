//! Routing decisions and their persisted records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::RoutingError;
use crate::memory::RoutingContext;

/// Which strategy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Deterministic rules engine
    #[default]
    Rules,
    /// LLM-backed strategy (external)
    Llm,
    /// Sage strategy (external)
    Sage,
    /// Blend of strategies
    Hybrid,
    /// Human override
    Manual,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::Rules => "rules",
            StrategyKind::Llm => "llm",
            StrategyKind::Sage => "sage",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// The engine's chosen destination for one routing evaluation, with a
/// calibrated confidence and a human-readable explanation.
///
/// Immutable once constructed; confidence outside `[0.0, 1.0]` is rejected at
/// construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub destination: String,
    pub confidence: f64,
    pub strategy: StrategyKind,
    pub reasoning: String,
    /// Ids of the rules that matched, in evaluation order
    pub matched_rules: Vec<String>,
    /// Free-form diagnostic factors (rule counts, scores, flags)
    pub decision_factors: BTreeMap<String, serde_json::Value>,
    /// Runner-up decisions, best first
    pub alternatives: Vec<RoutingDecision>,
    pub decided_at: DateTime<Utc>,
}

impl RoutingDecision {
    /// Create a decision, validating the confidence range.
    pub fn new(
        destination: impl Into<String>,
        confidence: f64,
        strategy: StrategyKind,
        reasoning: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(RoutingError::InvalidConfidence(confidence));
        }
        Ok(Self {
            destination: destination.into(),
            confidence,
            strategy,
            reasoning: reasoning.into(),
            matched_rules: Vec::new(),
            decision_factors: BTreeMap::new(),
            alternatives: Vec::new(),
            decided_at: Utc::now(),
        })
    }

    /// Attach the matched rule ids.
    pub fn with_matched_rules(mut self, rules: Vec<String>) -> Self {
        self.matched_rules = rules;
        self
    }

    /// Attach a decision factor.
    pub fn with_factor(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.decision_factors.insert(key.into(), value);
        self
    }

    /// Attach runner-up decisions.
    pub fn with_alternatives(mut self, alternatives: Vec<RoutingDecision>) -> Self {
        self.alternatives = alternatives;
        self
    }
}

/// Feedback attached to a recorded decision after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFeedback {
    /// Whether the routing turned out to be right
    pub correct: bool,
    /// Where the task actually ended up, if different
    pub actual_destination: Option<String>,
    pub notes: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// A decision persisted in the engine's history, keyed by a generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub decision: RoutingDecision,
    /// Snapshot of the context the decision was made against
    pub context: RoutingContext,
    pub metadata: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
    pub feedback: Option<DecisionFeedback>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_confidence_is_accepted() {
        for confidence in [0.0, 0.5, 1.0] {
            assert!(
                RoutingDecision::new("triage", confidence, StrategyKind::Rules, "ok").is_ok()
            );
        }
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        for confidence in [-0.1, 1.1, f64::NAN] {
            let result = RoutingDecision::new("triage", confidence, StrategyKind::Rules, "bad");
            assert!(matches!(result, Err(RoutingError::InvalidConfidence(_))));
        }
    }

    #[test]
    fn builder_attaches_fields() {
        let alt = RoutingDecision::new("backup", 0.4, StrategyKind::Rules, "alt").unwrap();
        let decision = RoutingDecision::new("triage", 0.9, StrategyKind::Rules, "matched")
            .unwrap()
            .with_matched_rules(vec!["r1".to_string()])
            .with_factor("num_rules_matched", serde_json::json!(1))
            .with_alternatives(vec![alt]);

        assert_eq!(decision.matched_rules, vec!["r1"]);
        assert_eq!(
            decision.decision_factors.get("num_rules_matched"),
            Some(&serde_json::json!(1))
        );
        assert_eq!(decision.alternatives.len(), 1);
    }
}
