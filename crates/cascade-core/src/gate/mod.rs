//! Threshold gates over rolling stage metrics.

use crate::metrics::MetricsTracker;
use crate::scoring::Bound;
use crate::stage::StageState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NOT_YET_EVALUATED: &str = "not yet evaluated";

/// Aggregate a gate predicate reads from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMetric {
    /// `counter / activations`.
    Ratio(String),
    /// Weighted sum of several `counter / activations` ratios.
    WeightedRatio(Vec<(String, f64)>),
    /// `total / activations`.
    Average(String),
    /// Raw counter value.
    Count(String),
    /// Most recent gauge value; zero if never set.
    Latest(String),
}

impl GateMetric {
    pub fn value(&self, metrics: &MetricsTracker) -> f64 {
        match self {
            GateMetric::Ratio(counter) => metrics.ratio(counter),
            GateMetric::WeightedRatio(parts) => parts
                .iter()
                .map(|(counter, weight)| weight * metrics.ratio(counter))
                .sum(),
            GateMetric::Average(total) => metrics.average(total),
            GateMetric::Count(counter) => metrics.counter(counter) as f64,
            GateMetric::Latest(gauge) => metrics.latest(gauge).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePredicate {
    pub name: String,
    pub metric: GateMetric,
    pub bound: Bound,
    /// Status reported when this is the first failing predicate.
    pub message: String,
}

impl GatePredicate {
    pub fn new(name: &str, metric: GateMetric, bound: Bound, message: &str) -> Self {
        Self {
            name: name.to_string(),
            metric,
            bound,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentReport {
    pub is_aligned: bool,
    pub ratios: BTreeMap<String, f64>,
    pub status: String,
}

/// AND of ordered predicates. The first failing predicate names the status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentGate {
    pub predicates: Vec<GatePredicate>,
    /// Reported alongside predicate values but never gating.
    #[serde(default)]
    pub observed: Vec<(String, GateMetric)>,
    pub aligned_status: String,
}

impl AlignmentGate {
    pub fn new(aligned_status: &str) -> Self {
        Self {
            predicates: Vec::new(),
            observed: Vec::new(),
            aligned_status: aligned_status.to_string(),
        }
    }

    pub fn require(mut self, predicate: GatePredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn observe(mut self, name: &str, metric: GateMetric) -> Self {
        self.observed.push((name.to_string(), metric));
        self
    }

    pub fn evaluate(&self, state: &StageState) -> AlignmentReport {
        let metrics = state.metrics();
        if metrics.activations() == 0 {
            return AlignmentReport {
                is_aligned: true,
                ratios: BTreeMap::new(),
                status: NOT_YET_EVALUATED.to_string(),
            };
        }

        let mut ratios = BTreeMap::new();
        let mut first_failure: Option<&GatePredicate> = None;
        for predicate in &self.predicates {
            let value = predicate.metric.value(metrics);
            ratios.insert(predicate.name.clone(), value);
            if !predicate.bound.holds(value) && first_failure.is_none() {
                first_failure = Some(predicate);
            }
        }
        for (name, metric) in &self.observed {
            ratios.insert(name.clone(), metric.value(metrics));
        }

        AlignmentReport {
            is_aligned: first_failure.is_none(),
            ratios,
            status: first_failure
                .map(|p| p.message.clone())
                .unwrap_or_else(|| self.aligned_status.clone()),
        }
    }
}
