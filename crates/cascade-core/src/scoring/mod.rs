//! Heuristic scoring primitives.
//!
//! Every scorer is a pure function of a parsed record (and, for balance
//! scores, a sibling stage's score). None of them can fail: an empty section
//! contributes its lowest tier.

mod balance;
mod composite;
mod keywords;
mod tiers;

pub use balance::BalanceBands;
pub use composite::{CompositeScorer, ScoreRule};
pub use keywords::{groups_present, tally_all, KeywordTally};
pub use tiers::{Bound, TierStep, TierTable};

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Limit of a signed criterion before normalization.
pub const CRITERION_LIMIT: i32 = 10;

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Maps a sum of signed criteria in `[-max_possible, max_possible]` onto `[0, 1]`.
pub fn normalize_signed(sum: f64, max_possible: f64) -> f64 {
    if max_possible <= 0.0 {
        return 0.0;
    }
    clamp_unit((sum + max_possible) / (2.0 * max_possible))
}

/// A criterion judgment in `[-10, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CriterionScore(i32);

impl CriterionScore {
    pub fn new(value: i32) -> Self {
        Self(value.clamp(-CRITERION_LIMIT, CRITERION_LIMIT))
    }

    /// Rounds toward zero after clamping; used for keyword tallies.
    pub fn from_tally(value: f64) -> Self {
        let limit = f64::from(CRITERION_LIMIT);
        Self(value.clamp(-limit, limit) as i32)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

/// Named scores produced by one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoreSet(BTreeMap<String, f64>);

impl ScoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a score clamped to `[0, 1]`.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), clamp_unit(value));
    }

    pub fn insert_bounded(&mut self, name: impl Into<String>, value: f64, min: f64, max: f64) {
        let value = if value.is_nan() { min } else { value.clamp(min, max) };
        self.0.insert(name.into(), value);
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn get_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect()
    }
}

impl From<ScoreSet> for BTreeMap<String, f64> {
    fn from(set: ScoreSet) -> Self {
        set.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_signed_maps_range_onto_unit() {
        assert_eq!(normalize_signed(-50.0, 50.0), 0.0);
        assert_eq!(normalize_signed(0.0, 50.0), 0.5);
        assert_eq!(normalize_signed(50.0, 50.0), 1.0);
        assert_eq!(normalize_signed(10.0, 50.0), 0.6);
        assert_eq!(normalize_signed(75.0, 50.0), 1.0);
    }

    #[test]
    fn criterion_score_is_clamped() {
        assert_eq!(CriterionScore::new(42).value(), 10);
        assert_eq!(CriterionScore::new(-11).value(), -10);
        assert_eq!(CriterionScore::from_tally(-12.5).value(), -10);
        assert_eq!(CriterionScore::from_tally(4.0).value(), 4);
        assert!(CriterionScore::new(-1).is_negative());
    }

    #[test]
    fn score_set_clamps_inserts() {
        let mut scores = ScoreSet::new().with("confidence", 1.7);
        scores.insert("severity", -0.2);
        scores.insert_bounded("raw", 42.0, -10.0, 10.0);
        assert_eq!(scores.get("confidence"), Some(1.0));
        assert_eq!(scores.get("severity"), Some(0.0));
        assert_eq!(scores.get("raw"), Some(10.0));
        assert_eq!(scores.get_or_zero("missing"), 0.0);
    }
}
