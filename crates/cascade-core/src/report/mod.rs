//! In-memory run summaries. Nothing here writes to disk or stdout.

pub mod summary;

pub use summary::{PipelineSummary, StageSummary, HEADLINE_FIELDS, SCHEMA_VERSION};
