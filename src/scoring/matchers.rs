//! Keyword, tag, priority, and fuzzy matchers.
//!
//! Each matcher returns whether the input matched and a score in `[0.0, 1.0]`.
//! Invalid regex patterns are skipped per-pattern (logged at warn level) so a
//! single bad pattern never aborts a whole rule evaluation.

use std::collections::HashSet;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::task::TaskPriority;

/// Result of a keyword match.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    /// Keywords found in the text, in the order given
    pub matched: Vec<String>,
    /// Fraction of keywords found
    pub score: f64,
}

/// Match keywords against free text.
///
/// Score is `|matched| / |keywords|`. With `whole_word` the keyword must land
/// on word boundaries; otherwise plain substring matching applies.
pub fn match_keywords(
    text: &str,
    keywords: &[String],
    case_sensitive: bool,
    whole_word: bool,
) -> KeywordMatch {
    if keywords.is_empty() {
        return KeywordMatch {
            matched: Vec::new(),
            score: 0.0,
        };
    }

    let haystack = if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    };

    let mut matched = Vec::new();
    for keyword in keywords {
        let found = if whole_word {
            let pattern = format!(r"\b{}\b", regex::escape(keyword));
            match RegexBuilder::new(&pattern)
                .case_insensitive(!case_sensitive)
                .build()
            {
                Ok(re) => re.is_match(text),
                Err(err) => {
                    tracing::warn!(keyword = %keyword, error = %err, "Skipping unbuildable keyword pattern");
                    false
                }
            }
        } else if case_sensitive {
            haystack.contains(keyword)
        } else {
            haystack.contains(&keyword.to_lowercase())
        };

        if found {
            matched.push(keyword.clone());
        }
    }

    let score = matched.len() as f64 / keywords.len() as f64;
    KeywordMatch { matched, score }
}

/// Tag matching criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagCriteria {
    /// Tags that must all be present
    pub required: Vec<String>,
    /// Tags that add to the score when present
    pub optional: Vec<String>,
    /// Regex patterns that add to the score when any tag matches
    pub patterns: Vec<String>,
}

impl TagCriteria {
    /// Whether no criteria were specified at all.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.optional.is_empty() && self.patterns.is_empty()
    }
}

/// Result of a tag match.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMatch {
    /// Whether the criteria were satisfied
    pub matched: bool,
    /// Tags that contributed to the match
    pub matched_tags: Vec<String>,
    /// Score in `[0.0, 1.0]`
    pub score: f64,
}

impl TagMatch {
    fn miss() -> Self {
        Self {
            matched: false,
            matched_tags: Vec::new(),
            score: 0.0,
        }
    }
}

/// Match a task's tags against tag criteria.
///
/// Missing any `required` tag fails the match outright. Otherwise the score
/// starts at a 0.5 base, gains up to 0.3 for the fraction of `optional` tags
/// present and up to 0.2 distributed evenly across `patterns` that match at
/// least one tag, capped at 1.0. Empty criteria always match with score 0.3,
/// which is what lets an administrator define a catch-all low-confidence rule.
pub fn match_tags(task_tags: &HashSet<String>, criteria: &TagCriteria) -> TagMatch {
    if criteria.is_empty() {
        return TagMatch {
            matched: true,
            matched_tags: Vec::new(),
            score: 0.3,
        };
    }

    let mut matched_tags = Vec::new();

    for required in &criteria.required {
        if !task_tags.contains(required) {
            return TagMatch::miss();
        }
        matched_tags.push(required.clone());
    }

    let mut score = 0.5;

    if !criteria.optional.is_empty() {
        let mut present = 0usize;
        for optional in &criteria.optional {
            if task_tags.contains(optional) {
                present += 1;
                matched_tags.push(optional.clone());
            }
        }
        score += 0.3 * (present as f64 / criteria.optional.len() as f64);
    }

    if !criteria.patterns.is_empty() {
        let per_pattern = 0.2 / criteria.patterns.len() as f64;
        for pattern in &criteria.patterns {
            let re = match regex::Regex::new(pattern) {
                Ok(re) => re,
                Err(err) => {
                    tracing::warn!(pattern = %pattern, error = %err, "Skipping invalid tag pattern");
                    continue;
                }
            };
            let mut hit = false;
            for tag in task_tags {
                if re.is_match(tag) {
                    if !matched_tags.contains(tag) {
                        matched_tags.push(tag.clone());
                    }
                    hit = true;
                }
            }
            if hit {
                score += per_pattern;
            }
        }
    }

    TagMatch {
        matched: true,
        matched_tags,
        score: score.min(1.0),
    }
}

/// Priority matching criteria.
///
/// `min` is the least urgent priority accepted, `max` the most urgent. A
/// non-empty `exact` list short-circuits the range check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityCriteria {
    pub min: Option<TaskPriority>,
    pub max: Option<TaskPriority>,
    pub exact: Vec<TaskPriority>,
}

impl PriorityCriteria {
    /// Whether no criteria were specified at all.
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.exact.is_empty()
    }
}

/// Match a task priority against priority criteria.
///
/// An `exact` hit scores 1.0. A range hit scores `1.0 - 0.2 * distance` from
/// the `min` bound, floored at 0.5. Empty criteria never match.
pub fn match_priority(priority: TaskPriority, criteria: &PriorityCriteria) -> (bool, f64) {
    if !criteria.exact.is_empty() {
        return if criteria.exact.contains(&priority) {
            (true, 1.0)
        } else {
            (false, 0.0)
        };
    }

    if criteria.is_empty() {
        return (false, 0.0);
    }

    // Lower index = more urgent: min bounds the least urgent accepted index,
    // max the most urgent.
    let min_index = criteria.min.unwrap_or(TaskPriority::Low).index();
    let max_index = criteria.max.unwrap_or(TaskPriority::Urgent).index();
    let index = priority.index();

    if index > min_index || index < max_index {
        return (false, 0.0);
    }

    let distance = (min_index - index) as f64;
    let score = (1.0 - 0.2 * distance).max(0.5);
    (true, score)
}

/// Result of a fuzzy match.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    /// Whether similarity cleared the threshold
    pub matched: bool,
    /// Similarity in `[0.0, 1.0]`
    pub similarity: f64,
}

/// Approximate string matching.
///
/// Exact substring containment scores 1.0. Otherwise similarity is the
/// Jaccard index over character sets, boosted to at least 0.8 when one string
/// contains the other after normalization. Matches iff similarity clears
/// `threshold`. Comparison is case-insensitive.
pub fn fuzzy_match(text: &str, pattern: &str, threshold: f64) -> FuzzyMatch {
    let text_norm = text.to_lowercase();
    let pattern_norm = pattern.to_lowercase();

    if !pattern_norm.is_empty() && text_norm.contains(&pattern_norm) {
        return FuzzyMatch {
            matched: true,
            similarity: 1.0,
        };
    }

    let text_chars: HashSet<char> = text_norm.chars().collect();
    let pattern_chars: HashSet<char> = pattern_norm.chars().collect();

    let union = text_chars.union(&pattern_chars).count();
    let mut similarity = if union == 0 {
        0.0
    } else {
        text_chars.intersection(&pattern_chars).count() as f64 / union as f64
    };

    if !text_norm.is_empty() && pattern_norm.contains(&text_norm) {
        similarity = similarity.max(0.8);
    }

    FuzzyMatch {
        matched: similarity >= threshold,
        similarity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn keywords(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keywords_score_is_fraction_matched() {
        let result = match_keywords(
            "database migration failed",
            &keywords(&["database", "network"]),
            false,
            false,
        );
        assert_eq!(result.matched, vec!["database".to_string()]);
        assert!((result.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn keywords_case_insensitive_by_default() {
        let result = match_keywords("Fix LOGIN page", &keywords(&["login"]), false, false);
        assert_eq!(result.score, 1.0);

        let result = match_keywords("Fix LOGIN page", &keywords(&["login"]), true, false);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn keywords_whole_word_requires_boundaries() {
        let result = match_keywords("the database is down", &keywords(&["base"]), false, true);
        assert_eq!(result.score, 0.0);

        let result = match_keywords("the database is down", &keywords(&["base"]), false, false);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn keywords_empty_list_scores_zero() {
        let result = match_keywords("anything", &[], false, false);
        assert_eq!(result.score, 0.0);
        assert!(result.matched.is_empty());
    }

    #[test]
    fn tags_missing_required_fails() {
        let criteria = TagCriteria {
            required: vec!["a".to_string(), "c".to_string()],
            ..Default::default()
        };
        let result = match_tags(&tags(&["a", "b"]), &criteria);
        assert!(!result.matched);
        assert!(result.matched_tags.is_empty());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn tags_required_only_scores_base() {
        let criteria = TagCriteria {
            required: vec!["bug".to_string()],
            ..Default::default()
        };
        let result = match_tags(&tags(&["bug", "login"]), &criteria);
        assert!(result.matched);
        assert!((result.score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn tags_optional_fraction_adds_up_to_point_three() {
        let criteria = TagCriteria {
            required: vec!["bug".to_string()],
            optional: vec!["login".to_string(), "urgent".to_string()],
            ..Default::default()
        };
        let result = match_tags(&tags(&["bug", "login"]), &criteria);
        assert!(result.matched);
        assert!((result.score - 0.65).abs() < 1e-9);
    }

    #[test]
    fn tags_patterns_share_point_two() {
        let criteria = TagCriteria {
            required: vec!["bug".to_string()],
            patterns: vec!["^log.*".to_string(), "^net.*".to_string()],
            ..Default::default()
        };
        let result = match_tags(&tags(&["bug", "login"]), &criteria);
        assert!(result.matched);
        assert!((result.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn tags_invalid_pattern_is_skipped() {
        let criteria = TagCriteria {
            required: vec!["bug".to_string()],
            patterns: vec!["[unclosed".to_string(), "^log.*".to_string()],
            ..Default::default()
        };
        let result = match_tags(&tags(&["bug", "login"]), &criteria);
        assert!(result.matched);
        // The invalid pattern contributes nothing but still splits the 0.2
        assert!((result.score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn tags_empty_criteria_is_catch_all() {
        let result = match_tags(&tags(&["anything"]), &TagCriteria::default());
        assert!(result.matched);
        assert!((result.score - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn tags_score_caps_at_one() {
        let criteria = TagCriteria {
            required: vec!["a".to_string()],
            optional: vec!["b".to_string()],
            patterns: vec![".*".to_string()],
        };
        let result = match_tags(&tags(&["a", "b"]), &criteria);
        assert!(result.score <= 1.0);
    }

    #[test]
    fn priority_exact_short_circuits() {
        let criteria = PriorityCriteria {
            min: Some(TaskPriority::Low),
            exact: vec![TaskPriority::High],
            ..Default::default()
        };
        assert_eq!(match_priority(TaskPriority::High, &criteria), (true, 1.0));
        assert_eq!(match_priority(TaskPriority::Low, &criteria), (false, 0.0));
    }

    #[test]
    fn priority_empty_criteria_never_matches() {
        assert_eq!(
            match_priority(TaskPriority::Urgent, &PriorityCriteria::default()),
            (false, 0.0)
        );
    }

    #[test]
    fn priority_range_scores_by_distance_from_min() {
        let criteria = PriorityCriteria {
            min: Some(TaskPriority::Low),
            ..Default::default()
        };
        assert_eq!(match_priority(TaskPriority::Low, &criteria), (true, 1.0));
        let (ok, score) = match_priority(TaskPriority::Medium, &criteria);
        assert!(ok);
        assert!((score - 0.8).abs() < 1e-9);
        let (ok, score) = match_priority(TaskPriority::Urgent, &criteria);
        assert!(ok);
        // Distance 3 would give 0.4; floored at 0.5
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn priority_outside_range_fails() {
        let criteria = PriorityCriteria {
            min: Some(TaskPriority::Medium),
            max: Some(TaskPriority::High),
            ..Default::default()
        };
        assert_eq!(match_priority(TaskPriority::Low, &criteria), (false, 0.0));
        assert_eq!(match_priority(TaskPriority::Urgent, &criteria), (false, 0.0));
        assert!(match_priority(TaskPriority::High, &criteria).0);
        assert!(match_priority(TaskPriority::Medium, &criteria).0);
    }

    #[test]
    fn fuzzy_exact_substring_is_perfect() {
        let result = fuzzy_match("deploy the auth service", "auth", 0.9);
        assert!(result.matched);
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn fuzzy_containment_boosts_to_point_eight() {
        // "abc" is contained in the pattern, not the other way around
        let result = fuzzy_match("abc", "abcdefghijklmnop", 0.0);
        assert!(result.similarity >= 0.8);
    }

    #[test]
    fn fuzzy_jaccard_over_character_sets() {
        let result = fuzzy_match("abcd", "cdef", 0.0);
        // intersection {c,d} = 2, union {a,b,c,d,e,f} = 6
        assert!((result.similarity - (2.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_threshold_gates_match() {
        let result = fuzzy_match("abcd", "cdef", 0.5);
        assert!(!result.matched);
        let result = fuzzy_match("abcd", "cdef", 0.3);
        assert!(result.matched);
    }
}
