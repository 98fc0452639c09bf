use crate::payload::Payload;
use crate::report::{PipelineSummary, HEADLINE_FIELDS};
use crate::stage::{StageFailure, StageId, StageOutput};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// How a run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Completed {
        final_output: Payload,
    },
    /// A stage verdict stopped the run.
    Rejected {
        stage: StageId,
        reason: String,
        suggested_modifications: Vec<String>,
    },
    Failed(StageFailure),
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }

    /// The stage that stopped the run, if any.
    pub fn halted_at(&self) -> Option<StageId> {
        match self {
            PipelineOutcome::Completed { .. } => None,
            PipelineOutcome::Rejected { stage, .. } => Some(*stage),
            PipelineOutcome::Failed(failure) => Some(failure.stage),
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Completed { .. } => write!(f, "pipeline completed"),
            PipelineOutcome::Rejected { stage, reason, .. } => {
                write!(f, "rejected at {}: {}", stage, reason)
            }
            PipelineOutcome::Failed(failure) => write!(f, "{}", failure),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub outcome: PipelineOutcome,
    /// Completed stage outputs in execution order.
    pub outputs: Vec<StageOutput>,
    pub summary: PipelineSummary,
}

impl PipelineReport {
    pub fn output(&self, stage: &str) -> Option<&StageOutput> {
        self.outputs.iter().find(|o| o.stage.name == stage)
    }

    /// Headline values of the stages that ran, keyed `stage.field`.
    pub fn headline(&self) -> Map<String, Value> {
        HEADLINE_FIELDS
            .iter()
            .filter_map(|(stage, field)| {
                let value = self.output(stage)?.fields.get(field)?.clone();
                Some((format!("{}.{}", stage, field), value))
            })
            .collect()
    }
}
