//! Rolling per-stage metrics.
//!
//! Only successful calls move activations, latency and domain counters.
//! Every call, successful or not, is appended to the history.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

pub(crate) fn serialize_millis<S>(duration: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_f64(duration.as_secs_f64() * 1000.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Output { kind: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub input_kind: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub success: bool,
}

/// Counter movements produced by one successful call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterUpdate {
    counts: Vec<(String, u64)>,
    totals: Vec<(String, f64)>,
    latest: Vec<(String, f64)>,
}

impl CounterUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` to a monotonic counter.
    pub fn count(mut self, name: &str, n: u64) -> Self {
        self.counts.push((name.to_string(), n));
        self
    }

    /// Adds one to `name` when `condition` holds.
    pub fn count_if(self, name: &str, condition: bool) -> Self {
        self.count(name, u64::from(condition))
    }

    /// Adds `value` to a running total, averaged later over activations.
    pub fn total(mut self, name: &str, value: f64) -> Self {
        self.totals.push((name.to_string(), value));
        self
    }

    /// Replaces a gauge with its most recent value.
    pub fn latest(mut self, name: &str, value: f64) -> Self {
        self.latest.push((name.to_string(), value));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsTracker {
    activations: u64,
    total_time: Duration,
    history: Vec<HistoryEntry>,
    counters: BTreeMap<String, u64>,
    totals: BTreeMap<String, f64>,
    latest: BTreeMap<String, f64>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(
        &mut self,
        duration: Duration,
        input_kind: &str,
        output_kind: &str,
        update: &CounterUpdate,
    ) {
        self.activations += 1;
        self.total_time += duration;
        for (name, n) in &update.counts {
            *self.counters.entry(name.clone()).or_insert(0) += n;
        }
        for (name, value) in &update.totals {
            *self.totals.entry(name.clone()).or_insert(0.0) += value;
        }
        for (name, value) in &update.latest {
            self.latest.insert(name.clone(), *value);
        }
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            input_kind: input_kind.to_string(),
            outcome: EntryOutcome::Output {
                kind: output_kind.to_string(),
            },
            duration,
            success: true,
        });
    }

    pub fn record_failure(&mut self, duration: Duration, input_kind: &str, error: &str) {
        self.history.push(HistoryEntry {
            timestamp: Utc::now(),
            input_kind: input_kind.to_string(),
            outcome: EntryOutcome::Error {
                message: error.to_string(),
            },
            duration,
            success: false,
        });
    }

    pub fn activations(&self) -> u64 {
        self.activations
    }

    pub fn total_time(&self) -> Duration {
        self.total_time
    }

    pub fn avg_time(&self) -> Duration {
        match u32::try_from(self.activations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_time / n,
            Err(_) => Duration::from_secs_f64(
                self.total_time.as_secs_f64() / self.activations as f64,
            ),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let successes = self.history.iter().filter(|e| e.success).count();
        successes as f64 / self.history.len() as f64
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn total(&self, name: &str) -> f64 {
        self.totals.get(name).copied().unwrap_or(0.0)
    }

    pub fn latest(&self, name: &str) -> Option<f64> {
        self.latest.get(name).copied()
    }

    /// `counter / activations`, zero before the first activation.
    pub fn ratio(&self, name: &str) -> f64 {
        if self.activations == 0 {
            return 0.0;
        }
        self.counter(name) as f64 / self.activations as f64
    }

    /// `total / activations`, zero before the first activation.
    pub fn average(&self, name: &str) -> f64 {
        if self.activations == 0 {
            return 0.0;
        }
        self.total(name) / self.activations as f64
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            activations: self.activations,
            total_time_ms: self.total_time.as_secs_f64() * 1000.0,
            avg_time_ms: self.avg_time().as_secs_f64() * 1000.0,
            success_rate: self.success_rate(),
            counters: self.counters.clone(),
            averages: self
                .totals
                .keys()
                .map(|k| (k.clone(), self.average(k)))
                .collect(),
            latest: self.latest.clone(),
            history: self.history.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub activations: u64,
    pub total_time_ms: f64,
    pub avg_time_ms: f64,
    pub success_rate: f64,
    pub counters: BTreeMap<String, u64>,
    pub averages: BTreeMap<String, f64>,
    pub latest: BTreeMap<String, f64>,
    pub history: Vec<HistoryEntry>,
}
