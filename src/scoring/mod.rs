//! Matching and scoring primitives.
//!
//! Pure, stateless functions that turn task attributes into match results and
//! calibrated scores in `[0.0, 1.0]`. The rules engine composes these; nothing
//! here holds state or does I/O.

pub mod aggregate;
pub mod matchers;

pub use aggregate::{
    aggregate_scores, estimate_uncertainty, rule_quality, should_escalate, AggregationMethod,
    ScoreError, DEFAULT_MIN_SAMPLES, DEFAULT_UNCERTAINTY_THRESHOLD,
};
pub use matchers::{
    fuzzy_match, match_keywords, match_priority, match_tags, FuzzyMatch, KeywordMatch,
    PriorityCriteria, TagCriteria, TagMatch,
};
