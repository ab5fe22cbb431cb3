//! Routing rules and their evaluation against a context.

use serde::{Deserialize, Serialize};

use crate::memory::RoutingContext;
use crate::scoring::{
    fuzzy_match, match_keywords, match_priority, match_tags, PriorityCriteria, TagCriteria,
};

/// Keyword criterion over the task's title and description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordCriteria {
    pub keywords: Vec<String>,
    pub case_sensitive: bool,
    pub whole_word: bool,
}

/// Fuzzy text criterion over the task's title and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyCriteria {
    pub pattern: String,
    pub threshold: f64,
}

impl Default for FuzzyCriteria {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            threshold: 0.7,
        }
    }
}

/// The matchers a rule applies. A rule matches only if every specified
/// criterion matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleCriteria {
    pub keywords: Option<KeywordCriteria>,
    pub tags: Option<TagCriteria>,
    pub priority: Option<PriorityCriteria>,
    pub fuzzy: Option<FuzzyCriteria>,
}

/// A named, weighted matcher-to-destination mapping with running accuracy
/// counters.
///
/// Rules are created and edited by an administrator; the engine itself only
/// mutates the counters, and only through the feedback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    /// Destination instance id this rule routes to
    pub destination: String,
    /// Multiplier applied to the criterion score, in `[0.0, 1.0]`
    pub weight: f64,
    /// Evaluation order; higher evaluates first
    pub priority: i32,
    pub enabled: bool,
    pub criteria: RuleCriteria,
    pub times_matched: u64,
    pub times_correct: u64,
    pub times_incorrect: u64,
}

impl Rule {
    /// Create an enabled rule with weight 1.0 and priority 0.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        destination: impl Into<String>,
        criteria: RuleCriteria,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            destination: destination.into(),
            weight: 1.0,
            priority: 0,
            enabled: true,
            criteria,
            times_matched: 0,
            times_correct: 0,
            times_incorrect: 0,
        }
    }

    /// Set the score weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the evaluation priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Disable the rule.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Evaluate this rule against a routing context.
    ///
    /// Returns `None` unless every specified criterion matches. The match
    /// score is the mean of the criterion scores multiplied by the rule
    /// weight.
    pub fn evaluate(&self, ctx: &RoutingContext) -> Option<RuleMatch> {
        let text = ctx.matchable_text();
        let mut scores = Vec::new();
        let mut reasons = Vec::new();

        if let Some(kw) = &self.criteria.keywords {
            let result = match_keywords(&text, &kw.keywords, kw.case_sensitive, kw.whole_word);
            if result.matched.is_empty() {
                return None;
            }
            reasons.push(format!(
                "keywords {:?} ({:.2})",
                result.matched, result.score
            ));
            scores.push(result.score);
        }

        if let Some(tags) = &self.criteria.tags {
            let result = match_tags(&ctx.task_tags, tags);
            if !result.matched {
                return None;
            }
            reasons.push(format!(
                "tags {:?} ({:.2})",
                result.matched_tags, result.score
            ));
            scores.push(result.score);
        }

        if let Some(priority) = &self.criteria.priority {
            let (ok, score) = match_priority(ctx.task_priority, priority);
            if !ok {
                return None;
            }
            reasons.push(format!("priority {} ({:.2})", ctx.task_priority, score));
            scores.push(score);
        }

        if let Some(fuzzy) = &self.criteria.fuzzy {
            let result = fuzzy_match(&text, &fuzzy.pattern, fuzzy.threshold);
            if !result.matched {
                return None;
            }
            reasons.push(format!(
                "text ~ '{}' ({:.2})",
                fuzzy.pattern, result.similarity
            ));
            scores.push(result.similarity);
        }

        if scores.is_empty() {
            // A rule with no criteria matches nothing rather than everything;
            // catch-all behavior belongs to an empty tag criterion.
            return None;
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let score = (mean * self.weight).clamp(0.0, 1.0);

        Some(RuleMatch {
            rule_id: self.id.clone(),
            rule_name: self.name.clone(),
            destination: self.destination.clone(),
            score,
            weight: self.weight,
            reason: format!("Rule '{}' matched: {}", self.name, reasons.join(", ")),
        })
    }
}

/// Result of one rule evaluating true against a context. Ephemeral, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule_id: String,
    pub rule_name: String,
    /// The matching rule's destination
    pub destination: String,
    pub score: f64,
    /// The rule's weight, carried for weighted aggregation
    pub weight: f64,
    pub reason: String,
}
