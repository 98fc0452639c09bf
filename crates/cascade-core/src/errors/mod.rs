mod backend;

pub use backend::{BackendError, BackendErrorKind};

use crate::stage::{FieldKind, StageId};
use thiserror::Error;

/// Input handed to a stage does not satisfy its declared contract.
///
/// Always a caller bug; never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputContractError {
    #[error("{stage}: missing required field '{field}'")]
    MissingField { stage: StageId, field: String },
    #[error("{stage}: field '{field}' must be {expected}, got {found}")]
    WrongShape {
        stage: StageId,
        field: String,
        expected: FieldKind,
        found: &'static str,
    },
    #[error("{stage}: field '{field}' must not be empty")]
    EmptyField { stage: StageId, field: String },
    #[error("{stage}: expected at least one of [{}]", .fields.join(", "))]
    MissingAnyOf { stage: StageId, fields: Vec<String> },
}

impl InputContractError {
    pub fn stage(&self) -> StageId {
        match self {
            InputContractError::MissingField { stage, .. }
            | InputContractError::WrongShape { stage, .. }
            | InputContractError::EmptyField { stage, .. }
            | InputContractError::MissingAnyOf { stage, .. } => *stage,
        }
    }

    /// The offending field, when a single one is to blame.
    pub fn field(&self) -> Option<&str> {
        match self {
            InputContractError::MissingField { field, .. }
            | InputContractError::WrongShape { field, .. }
            | InputContractError::EmptyField { field, .. } => Some(field),
            InputContractError::MissingAnyOf { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

/// Stage ordering or edge wiring that cannot run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineConfigError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("stage positions must be unique and ascending; '{name}' at {position} is out of order")]
    OutOfOrder { name: &'static str, position: u8 },
    #[error("stage '{name}' at {position} has no input edge")]
    MissingEdge { name: &'static str, position: u8 },
    #[error("edge into position {to} reads from position {from}, which does not run before it")]
    ForwardReference { to: u8, from: u8 },
    #[error("edge targets position {0}, which is not a stage of this pipeline")]
    UnknownTarget(u8),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("no stage named '{0}'")]
    UnknownStage(String),
    #[error("stage '{stage}' has no channel '{channel}'")]
    UnknownChannel { stage: String, channel: String },
    #[error(transparent)]
    Contract(#[from] InputContractError),
}
