use super::tiers::TierTable;
use serde::{Deserialize, Serialize};

/// Pairwise balance between two sibling scores.
///
/// Either side outside `[low, high]` caps the result regardless of how close
/// the two values are; inside the band the result is tiered by `|a - b|`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceBands {
    pub low: f64,
    pub high: f64,
    pub below_low: f64,
    pub above_high: f64,
    pub by_difference: TierTable,
}

impl Default for BalanceBands {
    fn default() -> Self {
        Self {
            low: 0.2,
            high: 0.9,
            below_low: 0.3,
            above_high: 0.4,
            by_difference: TierTable::below(&[(0.1, 1.0), (0.2, 0.9), (0.3, 0.75), (0.4, 0.6)])
                .or_else(0.5),
        }
    }
}

impl BalanceBands {
    pub fn score(&self, a: f64, b: f64) -> f64 {
        if a < self.low || b < self.low {
            return self.below_low;
        }
        if a > self.high || b > self.high {
            return self.above_high;
        }
        self.by_difference.eval((a - b).abs())
    }
}
