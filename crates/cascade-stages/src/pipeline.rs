//! The standard ten-stage wiring.

use crate::boundaries::{Boundaries, BOUNDARIES};
use crate::compassion::{Compassion, COMPASSION};
use crate::context::{Context, CONTEXT};
use crate::foundation::{Foundation, FOUNDATION};
use crate::manifestation::{Manifestation, MANIFESTATION};
use crate::objective::{ObjectiveStage, OBJECTIVE};
use crate::persistence::{Persistence, PERSISTENCE};
use crate::purity::PurityCheck;
use crate::reasoning::{Reasoning, REASONING};
use crate::structure::{Structure, STRUCTURE};
use crate::synthesis::{Synthesis, SYNTHESIS};
use anyhow::{bail, Context as _};
use cascade_core::config::CascadeConfig;
use cascade_core::judge::{SemanticJudge, JUDGE_PARAMS};
use cascade_core::pipeline::Edge;
use cascade_core::providers::llm::LlmClient;
use cascade_core::stage::{LlmStage, StageDefinition};
use cascade_core::{Pipeline, Stage, StageId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Every stage of the standard pipeline, in execution order.
pub const STANDARD_STAGES: [StageId; 10] = [
    OBJECTIVE,
    REASONING,
    CONTEXT,
    COMPASSION,
    BOUNDARIES,
    SYNTHESIS,
    PERSISTENCE,
    STRUCTURE,
    FOUNDATION,
    MANIFESTATION,
];

/// Field mappings between consecutive stages.
pub fn standard_edges() -> Vec<Edge> {
    let r = REASONING.position;
    let c = CONTEXT.position;
    let cp = COMPASSION.position;
    let b = BOUNDARIES.position;
    let s = SYNTHESIS.position;
    let p = PERSISTENCE.position;
    let st = STRUCTURE.position;
    let f = FOUNDATION.position;

    vec![
        Edge::into_stage(r)
            .initial("query", "action")
            .initial("context", "context"),
        Edge::into_stage(c)
            .fields(r, &["understanding", "analysis", "insights"])
            .initial("action", "action"),
        Edge::into_stage(cp)
            .fields(
                c,
                &[
                    "stakeholders",
                    "first_order_effects",
                    "second_order_effects",
                    "systemic_risks",
                    "ethical_considerations",
                ],
            )
            .initial("action", "action"),
        Edge::into_stage(b)
            .fields(
                cp,
                &[
                    "giving_opportunities",
                    "beneficiaries",
                    "generous_actions",
                    "compassion_score",
                    "expansion_potential",
                    "limits_needed",
                ],
            )
            .initial("action", "action"),
        Edge::into_stage(s)
            .output("compassion_output", cp)
            .output("boundaries_output", b)
            .initial("action", "action"),
        Edge::into_stage(p)
            .fields(
                s,
                &[
                    "balanced_decision",
                    "implementation_path",
                    "harmony_score",
                    "beauty_score",
                ],
            )
            .initial("action", "action"),
        Edge::into_stage(st)
            .fields(
                p,
                &[
                    "persistence_strategy",
                    "obstacles_identified",
                    "victory_conditions",
                    "endurance_plan",
                    "momentum_mechanisms",
                    "sustainability_score",
                ],
            )
            .initial("action", "action"),
        Edge::into_stage(f)
            .fields(
                st,
                &[
                    "structured_plan",
                    "communication_strategy",
                    "metrics_framework",
                    "documentation",
                    "stakeholder_messages",
                    "precision_score",
                    "clarity_score",
                ],
            )
            .initial("action", "action"),
        Edge::into_stage(MANIFESTATION.position)
            .fields(
                f,
                &[
                    "first_concrete_steps",
                    "manifestation_readiness",
                    "ready_to_manifest",
                    "resource_requirements",
                    "stakeholder_alignment",
                ],
            )
            .initial("action", "action"),
    ]
}

fn objective_stage(
    client: &Option<Arc<dyn LlmClient>>,
    config: &CascadeConfig,
) -> anyhow::Result<ObjectiveStage> {
    let mut judge = SemanticJudge::new(client.clone());
    let mut purity = None;
    if let Some(overrides) = config.stage(OBJECTIVE.name) {
        if overrides.markers.is_some() {
            bail!("stage '{}' parses no sections; markers cannot be overridden", OBJECTIVE.name);
        }
        judge = judge
            .with_params(overrides.apply_params(JUDGE_PARAMS))
            .with_enabled(overrides.semantic_scoring.unwrap_or(true));
        purity = overrides.purity;
    }
    let stage = ObjectiveStage::new(judge);
    Ok(match purity {
        Some(thresholds) => {
            debug!(stage = OBJECTIVE.name, ?thresholds, "framing check enabled");
            stage.with_purity(PurityCheck::new(thresholds))
        }
        None => stage,
    })
}

fn llm_stage<D>(
    definition: D,
    client: &Option<Arc<dyn LlmClient>>,
    config: &CascadeConfig,
) -> LlmStage<D>
where
    D: StageDefinition + 'static,
{
    let name = definition.id().name;
    let mut stage = LlmStage::new(definition, client.clone());
    if let Some(overrides) = config.stage(name) {
        let params = overrides.apply_params(stage.params());
        stage = stage.with_params(params);
        if let Some(markers) = &overrides.markers {
            stage = stage.with_markers(markers.clone());
        }
        if overrides.semantic_scoring.is_some() {
            warn!(stage = name, "semantic_scoring only applies to the objective stage");
        }
        if overrides.purity.is_some() {
            warn!(stage = name, "purity only applies to the objective stage");
        }
        debug!(stage = name, params = ?stage.params(), "stage overrides applied");
    }
    stage
}

/// Builds the ten stages with `config` overrides applied.
///
/// Without a client every LLM stage fails on its first call; the objective
/// stage still runs on keyword tallies alone.
pub fn standard_pipeline(
    client: Option<Arc<dyn LlmClient>>,
    config: &CascadeConfig,
) -> anyhow::Result<Pipeline> {
    config.validate().context("invalid cascade config")?;
    for name in config.stages.keys() {
        if !STANDARD_STAGES.iter().any(|id| id.name == name) {
            bail!("config overrides unknown stage '{}'", name);
        }
    }

    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(objective_stage(&client, config)?),
        Box::new(llm_stage(Reasoning, &client, config)),
        Box::new(llm_stage(Context, &client, config)),
        Box::new(llm_stage(Compassion, &client, config)),
        Box::new(llm_stage(Boundaries::default(), &client, config)),
        Box::new(llm_stage(Synthesis, &client, config)),
        Box::new(llm_stage(Persistence, &client, config)),
        Box::new(llm_stage(Structure, &client, config)),
        Box::new(llm_stage(Foundation, &client, config)),
        Box::new(llm_stage(Manifestation, &client, config)),
    ];
    Pipeline::new(stages, standard_edges()).context("standard wiring is inconsistent")
}
