//! Score aggregation, uncertainty estimation, and rule-quality statistics.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default uncertainty above which a decision should be escalated to a human.
pub const DEFAULT_UNCERTAINTY_THRESHOLD: f64 = 0.7;

/// Default number of matches required before rule quality is reported.
pub const DEFAULT_MIN_SAMPLES: u64 = 5;

/// Errors from score aggregation.
#[derive(Debug, Error, PartialEq)]
pub enum ScoreError {
    /// Weighted average called with mismatched weight count
    #[error("Weighted average needs {expected} weights, got {got}")]
    WeightMismatch { expected: usize, got: usize },
}

/// How multiple rule-match scores combine into one confidence value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Best single score wins
    #[default]
    Max,
    /// Arithmetic mean
    Avg,
    /// Weighted mean (caller supplies weights)
    WeightedAvg,
    /// Product of scores; a conservative AND
    Product,
    /// `1 - prod(1 - s)`; a probabilistic OR
    NoisyOr,
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max" => Ok(AggregationMethod::Max),
            "avg" => Ok(AggregationMethod::Avg),
            "weighted_avg" => Ok(AggregationMethod::WeightedAvg),
            "product" => Ok(AggregationMethod::Product),
            "noisy_or" => Ok(AggregationMethod::NoisyOr),
            _ => Err(format!("Unknown aggregation method: {}", s)),
        }
    }
}

impl std::fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationMethod::Max => write!(f, "max"),
            AggregationMethod::Avg => write!(f, "avg"),
            AggregationMethod::WeightedAvg => write!(f, "weighted_avg"),
            AggregationMethod::Product => write!(f, "product"),
            AggregationMethod::NoisyOr => write!(f, "noisy_or"),
        }
    }
}

/// Combine scores into a single confidence value.
///
/// An empty score list aggregates to 0.0 under every method. `weights` is
/// only consulted for `WeightedAvg` and must match the score count.
pub fn aggregate_scores(
    scores: &[f64],
    method: AggregationMethod,
    weights: Option<&[f64]>,
) -> Result<f64, ScoreError> {
    if scores.is_empty() {
        return Ok(0.0);
    }

    let value = match method {
        AggregationMethod::Max => scores.iter().copied().fold(0.0, f64::max),
        AggregationMethod::Avg => scores.iter().sum::<f64>() / scores.len() as f64,
        AggregationMethod::WeightedAvg => {
            let weights = weights.unwrap_or(&[]);
            if weights.len() != scores.len() {
                return Err(ScoreError::WeightMismatch {
                    expected: scores.len(),
                    got: weights.len(),
                });
            }
            let total: f64 = weights.iter().sum();
            if total == 0.0 {
                0.0
            } else {
                scores
                    .iter()
                    .zip(weights)
                    .map(|(s, w)| s * w)
                    .sum::<f64>()
                    / total
            }
        }
        AggregationMethod::Product => scores.iter().product(),
        AggregationMethod::NoisyOr => {
            1.0 - scores.iter().map(|s| 1.0 - s).product::<f64>()
        }
    };

    Ok(value.clamp(0.0, 1.0))
}

/// Uncertainty of a ranked score list: `1 - (top - second)`.
///
/// A wide margin between the two best candidates means a confident pick.
/// With fewer than two scores there is no margin to measure, so 0.0.
pub fn estimate_uncertainty(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    (1.0 - (sorted[0] - sorted[1])).clamp(0.0, 1.0)
}

/// Whether a decision should be deferred to a human.
///
/// True when confidence misses the threshold, or when the uncertainty between
/// top candidates exceeds `uncertainty_threshold`.
pub fn should_escalate(
    confidence: f64,
    threshold: f64,
    uncertainty: Option<f64>,
    uncertainty_threshold: f64,
) -> bool {
    if confidence < threshold {
        return true;
    }
    matches!(uncertainty, Some(u) if u > uncertainty_threshold)
}

/// Estimated accuracy of a rule from its feedback counters.
///
/// Returns `None` until the rule has matched at least `min_samples` times.
/// Below 30 feedback entries the estimate is Laplace-smoothed,
/// `(correct + 1) / (total + 2)`, to keep early feedback from swinging it to
/// the extremes; after that it is the plain success rate.
pub fn rule_quality(matched: u64, correct: u64, incorrect: u64, min_samples: u64) -> Option<f64> {
    if matched < min_samples {
        return None;
    }
    let total = correct + incorrect;
    if total < 30 {
        Some((correct as f64 + 1.0) / (total as f64 + 2.0))
    } else {
        Some(correct as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn max_takes_best_score() {
        let score = aggregate_scores(&[0.9, 0.2], AggregationMethod::Max, None).unwrap();
        assert_eq!(score, 0.9);
    }

    #[test]
    fn avg_is_arithmetic_mean() {
        let score = aggregate_scores(&[0.5, 0.5], AggregationMethod::Avg, None).unwrap();
        assert_eq!(score, 0.5);
    }

    #[test]
    fn empty_scores_aggregate_to_zero() {
        for method in [
            AggregationMethod::Max,
            AggregationMethod::Avg,
            AggregationMethod::WeightedAvg,
            AggregationMethod::Product,
            AggregationMethod::NoisyOr,
        ] {
            assert_eq!(aggregate_scores(&[], method, None).unwrap(), 0.0);
        }
    }

    #[test]
    fn weighted_avg_uses_weights() {
        let score = aggregate_scores(
            &[1.0, 0.0],
            AggregationMethod::WeightedAvg,
            Some(&[3.0, 1.0]),
        )
        .unwrap();
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn weighted_avg_rejects_mismatched_weights() {
        let result = aggregate_scores(&[0.5, 0.5], AggregationMethod::WeightedAvg, Some(&[1.0]));
        assert_eq!(
            result,
            Err(ScoreError::WeightMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn product_is_conservative() {
        let score = aggregate_scores(&[0.5, 0.5], AggregationMethod::Product, None).unwrap();
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn noisy_or_is_probabilistic_or() {
        let score = aggregate_scores(&[0.5, 0.5], AggregationMethod::NoisyOr, None).unwrap();
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn aggregation_method_from_str() {
        assert_eq!(
            "noisy_or".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::NoisyOr
        );
        assert_eq!(
            "MAX".parse::<AggregationMethod>().unwrap(),
            AggregationMethod::Max
        );
        assert!("median".parse::<AggregationMethod>().is_err());
    }

    #[test]
    fn uncertainty_is_inverse_margin() {
        assert!((estimate_uncertainty(&[0.9, 0.3]) - 0.4).abs() < 1e-9);
        // Unsorted input: the two best still define the margin
        assert!((estimate_uncertainty(&[0.3, 0.9, 0.8]) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn uncertainty_needs_two_scores() {
        assert_eq!(estimate_uncertainty(&[]), 0.0);
        assert_eq!(estimate_uncertainty(&[0.5]), 0.0);
    }

    #[test]
    fn escalates_on_low_confidence() {
        assert!(should_escalate(0.4, 0.7, None, DEFAULT_UNCERTAINTY_THRESHOLD));
        assert!(!should_escalate(0.8, 0.7, None, DEFAULT_UNCERTAINTY_THRESHOLD));
    }

    #[test]
    fn escalates_on_high_uncertainty() {
        assert!(should_escalate(
            0.9,
            0.7,
            Some(0.95),
            DEFAULT_UNCERTAINTY_THRESHOLD
        ));
        assert!(!should_escalate(
            0.9,
            0.7,
            Some(0.5),
            DEFAULT_UNCERTAINTY_THRESHOLD
        ));
    }

    #[test]
    fn quality_hidden_below_min_samples() {
        assert_eq!(rule_quality(4, 4, 0, DEFAULT_MIN_SAMPLES), None);
    }

    #[test]
    fn quality_smoothed_below_thirty_feedbacks() {
        // 9 correct of 10: smoothed to (9+1)/(10+2)
        let q = rule_quality(10, 9, 1, DEFAULT_MIN_SAMPLES).unwrap();
        assert!((q - 10.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn quality_plain_rate_at_volume() {
        let q = rule_quality(60, 45, 15, DEFAULT_MIN_SAMPLES).unwrap();
        assert!((q - 0.75).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn aggregate_stays_in_unit_interval(
            scores in proptest::collection::vec(0.0f64..=1.0, 0..8),
            method_idx in 0usize..4,
        ) {
            let method = [
                AggregationMethod::Max,
                AggregationMethod::Avg,
                AggregationMethod::Product,
                AggregationMethod::NoisyOr,
            ][method_idx];
            let score = aggregate_scores(&scores, method, None).unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn uncertainty_stays_in_unit_interval(
            scores in proptest::collection::vec(0.0f64..=1.0, 0..8),
        ) {
            let u = estimate_uncertainty(&scores);
            prop_assert!((0.0..=1.0).contains(&u));
        }
    }
}
