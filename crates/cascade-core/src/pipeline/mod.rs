//! Sequential composition of stages with explicit field wiring.

mod edge;
mod outcome;

pub use edge::{Edge, FieldMapping, FieldSource};
pub use outcome::{PipelineOutcome, PipelineReport};

use crate::errors::{ChannelError, InputContractError, PipelineConfigError};
use crate::gate::AlignmentReport;
use crate::metrics::MetricsSnapshot;
use crate::payload::Payload;
use crate::report::PipelineSummary;
use crate::stage::{Stage, StageId, StageOutcome, StageOutput, Verdict};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ordered stages plus the edges that feed each one.
///
/// Stages keep their state across runs. The first stage receives the initial
/// payload as-is unless an edge into it is declared.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    edges: BTreeMap<u8, Edge>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.ids())
            .field("edges", &self.edges.values().collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>, edges: Vec<Edge>) -> Result<Self, PipelineConfigError> {
        let first = stages.first().ok_or(PipelineConfigError::Empty)?.id();

        let mut previous: Option<u8> = None;
        for stage in &stages {
            let id = stage.id();
            if previous.is_some_and(|p| id.position <= p) {
                return Err(PipelineConfigError::OutOfOrder {
                    name: id.name,
                    position: id.position,
                });
            }
            previous = Some(id.position);
        }

        let positions: Vec<u8> = stages.iter().map(|s| s.id().position).collect();
        let mut by_target = BTreeMap::new();
        for edge in edges {
            if !positions.contains(&edge.to) {
                return Err(PipelineConfigError::UnknownTarget(edge.to));
            }
            if let Some(from) = edge
                .source_stages()
                .find(|from| *from >= edge.to || !positions.contains(from))
            {
                return Err(PipelineConfigError::ForwardReference { to: edge.to, from });
            }
            by_target.insert(edge.to, edge);
        }

        for stage in stages.iter().skip(1) {
            let id = stage.id();
            if !by_target.contains_key(&id.position) {
                return Err(PipelineConfigError::MissingEdge {
                    name: id.name,
                    position: id.position,
                });
            }
        }

        debug!(first = %first, stages = stages.len(), "pipeline wired");
        Ok(Self {
            stages,
            edges: by_target,
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn ids(&self) -> Vec<StageId> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    pub fn stage(&self, name: &str) -> Option<&dyn Stage> {
        self.index_of(name).map(|i| self.stages[i].as_ref())
    }

    pub fn edge(&self, position: u8) -> Option<&Edge> {
        self.edges.get(&position)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id().name == name)
    }

    /// Runs every stage in order until one rejects or fails.
    ///
    /// Contract violations abort the run and are returned as errors.
    pub async fn run(&mut self, initial: Payload) -> Result<PipelineReport, InputContractError> {
        let run_id = Uuid::new_v4();
        let mut summary = PipelineSummary::new(run_id);
        let mut outputs: BTreeMap<u8, StageOutput> = BTreeMap::new();
        let mut halted: Option<PipelineOutcome> = None;
        info!(%run_id, stages = self.stages.len(), "pipeline run started");

        for stage in self.stages.iter_mut() {
            let id = stage.id();
            let input = match self.edges.get(&id.position) {
                Some(edge) => edge.assemble(&initial, &outputs),
                None => initial.clone(),
            };

            let output = match stage.process(&input).await? {
                StageOutcome::Completed(output) => output,
                StageOutcome::Failed(failure) => {
                    warn!(%run_id, stage = id.name, error = %failure.error, "pipeline halted by stage failure");
                    halted = Some(PipelineOutcome::Failed(failure));
                    break;
                }
            };

            summary.push(&output);
            let verdict = stage.verdict(&output);
            outputs.insert(id.position, output);

            if let Verdict::Reject {
                reason,
                suggested_modifications,
            } = verdict
            {
                info!(%run_id, stage = id.name, %reason, "pipeline halted by rejection");
                halted = Some(PipelineOutcome::Rejected {
                    stage: id,
                    reason,
                    suggested_modifications,
                });
                break;
            }
        }

        let outputs: Vec<StageOutput> = outputs.into_values().collect();
        let outcome = match halted {
            Some(outcome) => outcome,
            None => PipelineOutcome::Completed {
                final_output: outputs
                    .last()
                    .map(|o| o.fields.clone())
                    .unwrap_or_default(),
            },
        };
        info!(%run_id, outcome = %outcome, completed = outputs.len(), "pipeline run finished");

        Ok(PipelineReport {
            run_id,
            outcome,
            outputs,
            summary,
        })
    }

    /// Declares a named link from one stage to another.
    pub fn connect(&mut self, from: &str, channel: &str, to: &str) -> Result<(), ChannelError> {
        let target = self
            .stage(to)
            .ok_or_else(|| ChannelError::UnknownStage(to.to_string()))?
            .id();
        let index = self
            .index_of(from)
            .ok_or_else(|| ChannelError::UnknownStage(from.to_string()))?;
        self.stages[index].state_mut().connect(channel, target);
        Ok(())
    }

    /// Delivers `payload` to the stage behind `from`'s channel and runs it.
    pub async fn send(
        &mut self,
        from: &str,
        channel: &str,
        payload: &Payload,
    ) -> Result<StageOutcome, ChannelError> {
        let source = self
            .stage(from)
            .ok_or_else(|| ChannelError::UnknownStage(from.to_string()))?;
        let target = source
            .state()
            .channel(channel)
            .ok_or_else(|| ChannelError::UnknownChannel {
                stage: from.to_string(),
                channel: channel.to_string(),
            })?;
        let index = self
            .index_of(target.name)
            .ok_or_else(|| ChannelError::UnknownStage(target.name.to_string()))?;
        debug!(from, channel, to = target.name, "channel send");
        Ok(self.stages[index].process(payload).await?)
    }

    pub fn validate(&self) -> Vec<(StageId, AlignmentReport)> {
        self.stages.iter().map(|s| (s.id(), s.validate())).collect()
    }

    pub fn metrics(&self) -> Vec<(StageId, MetricsSnapshot)> {
        self.stages
            .iter()
            .map(|s| (s.id(), s.state().metrics().snapshot()))
            .collect()
    }
}
