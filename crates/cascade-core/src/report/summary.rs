use crate::parser::ParsingDegradation;
use crate::scoring::ScoreSet;
use crate::stage::StageOutput;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current schema version for serialized summaries.
pub const SCHEMA_VERSION: u32 = 1;

/// `(stage name, output field)` pairs surfaced by a report headline.
pub const HEADLINE_FIELDS: &[(&str, &str)] = &[
    ("objective", "alignment_score"),
    ("reasoning", "confidence_level"),
    ("synthesis", "harmony_score"),
    ("foundation", "manifestation_readiness"),
    ("manifestation", "completion_percentage"),
    ("foundation", "ready_to_manifest"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub position: u8,
    pub name: &'static str,
    pub scores: ScoreSet,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<ParsingDegradation>,
}

impl From<&StageOutput> for StageSummary {
    fn from(output: &StageOutput) -> Self {
        Self {
            position: output.stage.position,
            name: output.stage.name,
            scores: output.scores.clone(),
            duration_ms: output.duration.as_millis() as u64,
            degradation: output.degradation.clone(),
        }
    }
}

/// Per-stage scores of one run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stages: Vec<StageSummary>,
}

impl PipelineSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            started_at: Utc::now(),
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, output: &StageOutput) {
        self.stages.push(StageSummary::from(output));
    }

    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// `{stage name -> {score name -> value}}`.
    pub fn key_scores(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.stages
            .iter()
            .map(|s| (s.name.to_string(), s.scores.clone().into()))
            .collect()
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.stages.iter().map(|s| s.duration_ms).sum()
    }

    pub fn degraded_stages(&self) -> Vec<&'static str> {
        self.stages
            .iter()
            .filter(|s| s.degradation.is_some())
            .map(|s| s.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;
    use crate::stage::StageId;
    use std::time::Duration;

    fn output(position: u8, name: &'static str, score: f64) -> StageOutput {
        StageOutput {
            stage: StageId::new(position, name),
            fields: Payload::new(),
            scores: ScoreSet::new().with("quality", score),
            degradation: (position == 2).then(|| ParsingDegradation::FallbackOnly {
                section: "analysis".into(),
            }),
            duration: Duration::from_millis(12),
        }
    }

    #[test]
    fn key_scores_group_by_stage() {
        let mut summary = PipelineSummary::new(Uuid::new_v4());
        summary.push(&output(1, "objective", 0.8));
        summary.push(&output(2, "reasoning", 0.4));

        let scores = summary.key_scores();
        assert_eq!(scores["objective"]["quality"], 0.8);
        assert_eq!(scores["reasoning"]["quality"], 0.4);
        assert_eq!(summary.total_duration_ms(), 24);
        assert_eq!(summary.degraded_stages(), vec!["reasoning"]);
        assert_eq!(summary.stage("objective").unwrap().position, 1);
    }

    #[test]
    fn serializes_with_schema_version() {
        let mut summary = PipelineSummary::new(Uuid::nil());
        summary.push(&output(1, "objective", 1.0));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["run_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(json["stages"][0]["name"], "objective");
        assert!(json["stages"][0].get("degradation").is_none());
    }
}
