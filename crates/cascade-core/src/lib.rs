//! Shared framework for multi-stage LLM evaluation pipelines.
//!
//! Each stage sends one prompt to a completion backend, turns the free-form
//! response into a [`parser::ParsedRecord`], scores it, feeds rolling metrics
//! and hands selected fields to the next stage.

pub mod config;
pub mod errors;
pub mod gate;
pub mod judge;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod payload;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod scoring;
pub mod stage;

pub use errors::{BackendError, BackendErrorKind, InputContractError};
pub use parser::{parse, MarkerSpec, ParsedRecord, SectionValue};
pub use payload::Payload;
pub use pipeline::{Pipeline, PipelineOutcome, PipelineReport};
pub use stage::{Stage, StageId, StageOutcome, StageOutput};
