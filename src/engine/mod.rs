//! Rules engine.
//!
//! Owns an ordered rule set, evaluates it against a [`RoutingContext`] using
//! the scoring primitives, aggregates matches into a [`RoutingDecision`], and
//! records decisions and feedback. Rule statistics only ever change through
//! the feedback path, under the rule-table lock.

mod decision;
mod error;
mod history;
mod rule;
mod strategy;

pub use decision::{DecisionFeedback, DecisionRecord, RoutingDecision, StrategyKind};
pub use error::RoutingError;
pub use history::DecisionHistory;
pub use rule::{FuzzyCriteria, KeywordCriteria, Rule, RuleCriteria, RuleMatch};
pub use strategy::RoutingStrategy;

use std::sync::RwLock;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::memory::{RecentDecision, RoutingContext};
use crate::scoring::{
    aggregate_scores, estimate_uncertainty, rule_quality, should_escalate, AggregationMethod,
    DEFAULT_UNCERTAINTY_THRESHOLD,
};

/// Quality estimate for one rule, for administrator review.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleQuality {
    pub rule_id: String,
    pub name: String,
    /// `None` until the rule has matched enough times to judge
    pub quality: Option<f64>,
}

/// The deterministic, explainable routing strategy.
///
/// Designed to be shared across concurrent request handlers: the rule table
/// sits behind one `RwLock`, decision history behind its own store, and all
/// exchanged values ([`RoutingContext`], [`RoutingDecision`]) are immutable.
///
/// # Examples
///
/// ```
/// use trellis::config::EngineConfig;
/// use trellis::engine::{Rule, RuleCriteria, RulesEngine};
/// use trellis::memory::RoutingContext;
/// use trellis::scoring::TagCriteria;
/// use trellis::task::{Task, TaskPriority};
///
/// let engine = RulesEngine::new(EngineConfig::default());
/// engine.add_rule(Rule::new(
///     "bug-rule-id",
///     "bug",
///     "triage",
///     RuleCriteria {
///         tags: Some(TagCriteria {
///             required: vec!["bug".to_string()],
///             ..Default::default()
///         }),
///         ..Default::default()
///     },
/// ));
///
/// let task = Task::new("t1", "Login broken", "", vec!["bug".to_string()], TaskPriority::High);
/// let ctx = RoutingContext::from_task(&task, None);
/// let decision = engine.route_task(&ctx).unwrap();
/// assert_eq!(decision.destination, "triage");
/// ```
pub struct RulesEngine {
    /// Sorted by priority descending; ties keep insertion order
    rules: RwLock<Vec<Rule>>,
    default_destination: Option<String>,
    confidence_threshold: f64,
    aggregation: AggregationMethod,
    min_samples: u64,
    history: DecisionHistory,
}

impl RulesEngine {
    /// Create an engine from configuration, with an empty rule set.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            default_destination: config.default_destination,
            confidence_threshold: config.confidence_threshold,
            aggregation: config.aggregation,
            min_samples: config.min_samples,
            history: DecisionHistory::new(config.max_history),
        }
    }

    /// Create an engine pre-loaded with rules.
    pub fn with_rules(config: EngineConfig, rules: Vec<Rule>) -> Self {
        let engine = Self::new(config);
        for rule in rules {
            engine.add_rule(rule);
        }
        engine
    }

    /// Add a rule, replacing any existing rule with the same id, and re-sort
    /// the table by priority.
    pub fn add_rule(&self, rule: Rule) {
        let mut rules = self.write_rules();
        if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
            tracing::debug!(rule_id = %rule.id, "Replacing existing rule");
            *existing = rule;
        } else {
            rules.push(rule);
        }
        // Stable sort: equal priorities keep insertion order
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
    }

    /// Remove a rule by id.
    pub fn remove_rule(&self, rule_id: &str) -> Option<Rule> {
        let mut rules = self.write_rules();
        let index = rules.iter().position(|r| r.id == rule_id)?;
        Some(rules.remove(index))
    }

    /// Get a rule snapshot by id.
    pub fn get_rule(&self, rule_id: &str) -> Option<Rule> {
        self.read_rules().iter().find(|r| r.id == rule_id).cloned()
    }

    /// Rule snapshots in evaluation order.
    pub fn list_rules(&self, enabled_only: bool) -> Vec<Rule> {
        self.read_rules()
            .iter()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect()
    }

    /// Evaluate every enabled rule against the context, in priority order.
    pub fn evaluate(&self, ctx: &RoutingContext) -> Vec<RuleMatch> {
        self.read_rules()
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(|rule| rule.evaluate(ctx))
            .collect()
    }

    /// Route a task: the best-scoring matched rule names the destination, and
    /// all matched scores aggregate into the confidence.
    ///
    /// Falls back to the configured default destination (confidence 0.5,
    /// `used_default` factor) when nothing matches; fails with
    /// [`RoutingError::NoDestination`] when there is no default either.
    pub fn route_task(&self, ctx: &RoutingContext) -> Result<RoutingDecision, RoutingError> {
        let matches = self.evaluate(ctx);

        if matches.is_empty() {
            return match &self.default_destination {
                Some(destination) => {
                    tracing::debug!(
                        task_id = %ctx.task_id,
                        destination = %destination,
                        "No rules matched; using default destination"
                    );
                    metrics::counter!("trellis_decisions_total", "outcome" => "default")
                        .increment(1);
                    Ok(RoutingDecision::new(
                        destination.clone(),
                        0.5,
                        StrategyKind::Rules,
                        "No rules matched; routed to the default destination",
                    )?
                    .with_factor("used_default", json!(true)))
                }
                None => {
                    metrics::counter!("trellis_decisions_total", "outcome" => "unroutable")
                        .increment(1);
                    Err(RoutingError::NoDestination {
                        task_id: ctx.task_id.clone(),
                    })
                }
            };
        }

        let decision = self.decision_from_matches(&matches)?;
        tracing::info!(
            task_id = %ctx.task_id,
            destination = %decision.destination,
            confidence = decision.confidence,
            rules_matched = matches.len(),
            "Routed task"
        );
        metrics::counter!("trellis_decisions_total", "outcome" => "matched").increment(1);
        Ok(decision)
    }

    /// Ranked candidate destinations.
    ///
    /// Matches are grouped by destination (each rule counts once toward its
    /// destination), each group aggregates like [`RulesEngine::route_task`],
    /// and the results sort by confidence descending, truncated to `limit`.
    pub fn suggest_destinations(
        &self,
        ctx: &RoutingContext,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, RoutingError> {
        let matches = self.evaluate(ctx);

        // Group by destination, preserving first-seen order
        let mut groups: Vec<(String, Vec<RuleMatch>)> = Vec::new();
        for m in matches {
            match groups.iter_mut().find(|(dest, _)| dest == &m.destination) {
                Some((_, group)) => {
                    if !group.iter().any(|g| g.rule_id == m.rule_id) {
                        group.push(m);
                    }
                }
                None => groups.push((m.destination.clone(), vec![m])),
            }
        }

        let mut decisions = Vec::with_capacity(groups.len());
        for (_, group) in &groups {
            decisions.push(self.decision_from_matches(group)?);
        }
        decisions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        decisions.truncate(limit);
        Ok(decisions)
    }

    /// Persist a decision in the bounded history. Returns the generated id.
    ///
    /// Recording never mutates rule statistics; only feedback does.
    pub fn record_decision(
        &self,
        decision: &RoutingDecision,
        ctx: &RoutingContext,
        metadata: Option<serde_json::Value>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.history.insert(DecisionRecord {
            id: id.clone(),
            decision: decision.clone(),
            context: ctx.clone(),
            metadata,
            recorded_at: Utc::now(),
            feedback: None,
        });
        id
    }

    /// Report how a recorded decision turned out.
    ///
    /// Every rule in the decision's `matched_rules` gets its match counter
    /// bumped, plus correct or incorrect per the verdict. An unknown id is a
    /// logged no-op (feedback may arrive after history eviction) and returns
    /// false.
    pub fn provide_feedback(
        &self,
        decision_id: &str,
        correct: bool,
        actual_destination: Option<&str>,
        notes: Option<&str>,
    ) -> bool {
        let feedback = DecisionFeedback {
            correct,
            actual_destination: actual_destination.map(str::to_string),
            notes: notes.map(str::to_string),
            received_at: Utc::now(),
        };

        let Some(rule_ids) = self.history.attach_feedback(decision_id, feedback) else {
            tracing::warn!(
                decision_id = %decision_id,
                "Feedback for unknown decision id; ignoring"
            );
            return false;
        };

        let mut rules = self.write_rules();
        for rule_id in &rule_ids {
            if let Some(rule) = rules.iter_mut().find(|r| &r.id == rule_id) {
                rule.times_matched += 1;
                if correct {
                    rule.times_correct += 1;
                } else {
                    rule.times_incorrect += 1;
                }
            }
        }
        metrics::counter!("trellis_feedback_total").increment(1);
        true
    }

    /// Render a decision as human-readable text. Pure presentation.
    pub fn explain_decision(&self, decision: &RoutingDecision) -> String {
        let mut out = String::new();
        out.push_str(&format!("Destination: {}\n", decision.destination));
        out.push_str(&format!("Confidence: {:.1}%\n", decision.confidence * 100.0));
        out.push_str(&format!("Strategy: {}\n", decision.strategy));
        out.push_str(&format!("Reasoning: {}\n", decision.reasoning));

        if !decision.matched_rules.is_empty() {
            out.push_str("Matched rules:\n");
            let rules = self.read_rules();
            for rule_id in &decision.matched_rules {
                match rules.iter().find(|r| &r.id == rule_id) {
                    Some(rule) => out.push_str(&format!(
                        "  - {} ({}): routes to {}\n",
                        rule.name, rule.id, rule.destination
                    )),
                    None => out.push_str(&format!("  - {} (no longer defined)\n", rule_id)),
                }
            }
        }

        if !decision.decision_factors.is_empty() {
            out.push_str("Decision factors:\n");
            for (key, value) in &decision.decision_factors {
                out.push_str(&format!("  {}: {}\n", key, value));
            }
        }

        out
    }

    /// Confidence below which decisions should be escalated.
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Whether a decision should be deferred to a human, judging both its
    /// confidence and the margin to its alternatives.
    pub fn requires_escalation(&self, decision: &RoutingDecision) -> bool {
        let mut scores = vec![decision.confidence];
        scores.extend(decision.alternatives.iter().map(|a| a.confidence));
        let uncertainty = estimate_uncertainty(&scores);
        should_escalate(
            decision.confidence,
            self.confidence_threshold,
            Some(uncertainty),
            DEFAULT_UNCERTAINTY_THRESHOLD,
        )
    }

    /// Per-rule accuracy estimates for administrator review.
    pub fn rule_quality_report(&self) -> Vec<RuleQuality> {
        self.read_rules()
            .iter()
            .map(|rule| RuleQuality {
                rule_id: rule.id.clone(),
                name: rule.name.clone(),
                quality: rule_quality(
                    rule.times_matched,
                    rule.times_correct,
                    rule.times_incorrect,
                    self.min_samples,
                ),
            })
            .collect()
    }

    /// The most recent recorded decisions, newest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<RecentDecision> {
        self.history.recent(limit)
    }

    /// Fetch a recorded decision by id.
    pub fn get_decision(&self, decision_id: &str) -> Option<DecisionRecord> {
        self.history.get(decision_id)
    }

    fn decision_from_matches(&self, matches: &[RuleMatch]) -> Result<RoutingDecision, RoutingError> {
        // First-seen wins ties, matching evaluation order
        let mut best = &matches[0];
        for m in matches {
            if m.score > best.score {
                best = m;
            }
        }

        let scores: Vec<f64> = matches.iter().map(|m| m.score).collect();
        let weights: Vec<f64> = matches.iter().map(|m| m.weight).collect();
        let weights_arg = match self.aggregation {
            AggregationMethod::WeightedAvg => Some(weights.as_slice()),
            _ => None,
        };
        let confidence = aggregate_scores(&scores, self.aggregation, weights_arg)?;

        let reasoning = matches
            .iter()
            .map(|m| m.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Ok(RoutingDecision::new(
            best.destination.clone(),
            confidence,
            StrategyKind::Rules,
            reasoning,
        )?
        .with_matched_rules(matches.iter().map(|m| m.rule_id.clone()).collect())
        .with_factor("num_rules_matched", json!(matches.len()))
        .with_factor("total_score", json!(scores.iter().sum::<f64>()))
        .with_factor("best_score", json!(best.score)))
    }

    fn read_rules(&self) -> std::sync::RwLockReadGuard<'_, Vec<Rule>> {
        self.rules.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_rules(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Rule>> {
        self.rules.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl RoutingStrategy for RulesEngine {
    fn route_task(&self, ctx: &RoutingContext) -> Result<RoutingDecision, RoutingError> {
        RulesEngine::route_task(self, ctx)
    }

    fn suggest_destinations(
        &self,
        ctx: &RoutingContext,
        limit: usize,
    ) -> Result<Vec<RoutingDecision>, RoutingError> {
        RulesEngine::suggest_destinations(self, ctx, limit)
    }

    fn record_decision(
        &self,
        decision: &RoutingDecision,
        ctx: &RoutingContext,
        metadata: Option<serde_json::Value>,
    ) -> String {
        RulesEngine::record_decision(self, decision, ctx, metadata)
    }

    fn provide_feedback(
        &self,
        decision_id: &str,
        correct: bool,
        actual_destination: Option<&str>,
        notes: Option<&str>,
    ) -> bool {
        RulesEngine::provide_feedback(self, decision_id, correct, actual_destination, notes)
    }

    fn confidence_threshold(&self) -> f64 {
        RulesEngine::confidence_threshold(self)
    }

    fn explain_decision(&self, decision: &RoutingDecision) -> String {
        RulesEngine::explain_decision(self, decision)
    }
}
