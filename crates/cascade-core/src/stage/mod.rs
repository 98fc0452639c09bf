//! Stage abstraction: one pipeline position, one backend call per `process`.

mod contract;
mod llm;
mod state;

pub use contract::{FieldKind, FieldSpec, InputContract};
pub use llm::{Evaluation, LlmStage, StageDefinition};
pub use state::StageState;

use crate::errors::{BackendError, InputContractError};
use crate::gate::AlignmentReport;
use crate::metrics::serialize_millis;
use crate::parser::ParsingDegradation;
use crate::payload::Payload;
use crate::scoring::ScoreSet;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Input kind recorded in history for payload-driven calls.
pub const PAYLOAD_INPUT: &str = "payload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StageId {
    pub position: u8,
    pub name: &'static str,
}

impl StageId {
    pub const fn new(position: u8, name: &'static str) -> Self {
        Self { position, name }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.position, self.name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageOutput {
    pub stage: StageId,
    pub fields: Payload,
    pub scores: ScoreSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation: Option<ParsingDegradation>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: StageId,
    pub error: BackendError,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.error)
    }
}

/// Result of a `process` call that got past input validation.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Completed(StageOutput),
    Failed(StageFailure),
}

impl StageOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StageOutcome::Completed(_))
    }

    pub fn output(&self) -> Option<&StageOutput> {
        match self {
            StageOutcome::Completed(output) => Some(output),
            StageOutcome::Failed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<StageOutput, StageFailure> {
        match self {
            StageOutcome::Completed(output) => Ok(output),
            StageOutcome::Failed(failure) => Err(failure),
        }
    }
}

/// A stage's own accept/reject decision on a completed output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Proceed,
    Reject {
        reason: String,
        suggested_modifications: Vec<String>,
    },
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Validates `input`, then runs the stage. Only contract violations are
    /// returned as errors; backend failures come back as
    /// [`StageOutcome::Failed`].
    async fn process(&mut self, input: &Payload) -> Result<StageOutcome, InputContractError>;

    fn validate(&self) -> AlignmentReport;

    fn state(&self) -> &StageState;

    fn state_mut(&mut self) -> &mut StageState;

    fn verdict(&self, _output: &StageOutput) -> Verdict {
        Verdict::Proceed
    }
}
