//! The ten evaluation stages of the cascade and their standard wiring.
//!
//! An action is first checked against the fundamental objective, then
//! analysed, placed in context, weighed for compassion and for the limits
//! compassion needs, synthesised into one decision, made durable, structured
//! into a plan, grounded in reality and finally executed. Each stage after
//! the first is an [`cascade_core::stage::LlmStage`] around a
//! [`cascade_core::stage::StageDefinition`] declared here.
//!
//! ```no_run
//! # async fn run() -> anyhow::Result<()> {
//! use cascade_core::config::CascadeConfig;
//! use cascade_core::Payload;
//!
//! let config = CascadeConfig::default();
//! let client = cascade_core::providers::llm::build_client(&config.backend)?;
//! let mut pipeline = cascade_stages::standard_pipeline(client, &config)?;
//! let report = pipeline
//!     .run(Payload::new().with("action", "open a free clinic"))
//!     .await?;
//! println!("{}", serde_json::Value::Object(report.headline()));
//! # Ok(())
//! # }
//! ```

mod prompt;
mod text;

pub mod boundaries;
pub mod compassion;
pub mod context;
pub mod foundation;
pub mod manifestation;
pub mod objective;
pub mod persistence;
pub mod pipeline;
pub mod purity;
pub mod reasoning;
pub mod structure;
pub mod synthesis;

pub use boundaries::Boundaries;
pub use compassion::Compassion;
pub use context::Context;
pub use foundation::Foundation;
pub use manifestation::Manifestation;
pub use objective::{Criterion, ObjectiveAssessment, ObjectiveStage};
pub use persistence::Persistence;
pub use pipeline::{standard_edges, standard_pipeline, STANDARD_STAGES};
pub use purity::{BiasIssue, BiasLevel, PurityCheck, PurityReport};
pub use reasoning::Reasoning;
pub use structure::Structure;
pub use synthesis::Synthesis;
