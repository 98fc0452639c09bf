use serde::{Deserialize, Serialize};

/// Condition a measured quantity must meet for a tier to apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    AtLeast(f64),
    Above(f64),
    Below(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
}

impl Bound {
    pub fn holds(&self, x: f64) -> bool {
        match *self {
            Bound::AtLeast(t) => x >= t,
            Bound::Above(t) => x > t,
            Bound::Below(t) => x < t,
            Bound::Between(lo, hi) => x >= lo && x <= hi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStep {
    pub when: Bound,
    pub value: f64,
}

/// Ordered tiers; the first step whose bound holds decides the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub steps: Vec<TierStep>,
    #[serde(default)]
    pub otherwise: f64,
}

impl TierTable {
    /// `x >= threshold` tiers, highest threshold first.
    pub fn at_least(steps: &[(f64, f64)]) -> Self {
        Self::from_steps(steps, Bound::AtLeast)
    }

    /// `x > threshold` tiers, highest threshold first.
    pub fn above(steps: &[(f64, f64)]) -> Self {
        Self::from_steps(steps, Bound::Above)
    }

    /// `x < threshold` tiers, lowest threshold first.
    pub fn below(steps: &[(f64, f64)]) -> Self {
        Self::from_steps(steps, Bound::Below)
    }

    fn from_steps(steps: &[(f64, f64)], bound: fn(f64) -> Bound) -> Self {
        Self {
            steps: steps
                .iter()
                .map(|&(threshold, value)| TierStep {
                    when: bound(threshold),
                    value,
                })
                .collect(),
            otherwise: 0.0,
        }
    }

    pub fn then(mut self, when: Bound, value: f64) -> Self {
        self.steps.push(TierStep { when, value });
        self
    }

    pub fn or_else(mut self, value: f64) -> Self {
        self.otherwise = value;
        self
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.steps
            .iter()
            .find(|step| step.when.holds(x))
            .map(|step| step.value)
            .unwrap_or(self.otherwise)
    }

    pub fn eval_count(&self, n: usize) -> f64 {
        self.eval(n as f64)
    }

    pub fn min_value(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.value)
            .fold(self.otherwise, f64::min)
    }

    pub fn max_value(&self) -> f64 {
        self.steps
            .iter()
            .map(|s| s.value)
            .fold(self.otherwise, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_met_tier_wins() {
        let tiers = TierTable::at_least(&[(5.0, 0.35), (3.0, 0.25), (1.0, 0.15)]);
        assert_eq!(tiers.eval_count(7), 0.35);
        assert_eq!(tiers.eval_count(5), 0.35);
        assert_eq!(tiers.eval_count(4), 0.25);
        assert_eq!(tiers.eval_count(1), 0.15);
        assert_eq!(tiers.eval_count(0), 0.0);
    }

    #[test]
    fn above_is_strict() {
        let tiers = TierTable::above(&[(200.0, 0.25), (100.0, 0.2)]);
        assert_eq!(tiers.eval(200.0), 0.2);
        assert_eq!(tiers.eval(201.0), 0.25);
        assert_eq!(tiers.eval(100.0), 0.0);
    }

    #[test]
    fn mixed_steps_and_negative_otherwise() {
        let tiers = TierTable::above(&[(50.0, 0.1)])
            .then(Bound::Below(30.0), -0.1)
            .or_else(0.0);
        assert_eq!(tiers.eval(60.0), 0.1);
        assert_eq!(tiers.eval(40.0), 0.0);
        assert_eq!(tiers.eval(10.0), -0.1);
        assert_eq!(tiers.min_value(), -0.1);
        assert_eq!(tiers.max_value(), 0.1);
    }

    #[test]
    fn between_is_inclusive() {
        let tiers = TierTable::default()
            .then(Bound::Between(3.0, 6.0), 0.3)
            .then(Bound::Between(2.0, 8.0), 0.2)
            .then(Bound::AtLeast(1.0), 0.1);
        assert_eq!(tiers.eval_count(3), 0.3);
        assert_eq!(tiers.eval_count(6), 0.3);
        assert_eq!(tiers.eval_count(8), 0.2);
        assert_eq!(tiers.eval_count(12), 0.1);
        assert_eq!(tiers.eval_count(0), 0.0);
    }

    #[test]
    fn tiers_deserialize_from_json() {
        let tiers: TierTable = serde_json::from_str(
            r#"{"steps": [{"when": {"at_least": 2.0}, "value": 0.2}], "otherwise": 0.05}"#,
        )
        .unwrap();
        assert_eq!(tiers.eval_count(2), 0.2);
        assert_eq!(tiers.eval_count(1), 0.05);
    }
}
