//! Stage 6: one decision that honours both compassion and its boundaries.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};

pub const SYNTHESIS: StageId = StageId::new(6, "synthesis");

const ROLE: &str = "You are the synthesis stage of an evaluation pipeline. You receive a \
compassion analysis and a boundaries analysis of the same action. Do not average them or \
settle for a lukewarm compromise: find the decision that honours both principles at once.";

#[derive(Debug, Clone, Default)]
pub struct Synthesis;

impl Synthesis {
    fn harmony(&self) -> CompositeScorer {
        CompositeScorer::new("harmony_score")
            .rule(ScoreRule::count(
                "conflicts_resolved",
                TierTable::at_least(&[(4.0, 0.35), (3.0, 0.25), (2.0, 0.15)]),
            ))
            .rule(ScoreRule::length(
                "synthesis",
                TierTable::above(&[(300.0, 0.3), (150.0, 0.2), (50.0, 0.1)]),
            ))
            .rule(ScoreRule::min_length(
                &["compassion_integration", "boundaries_integration"],
                TierTable::above(&[(100.0, 0.35), (50.0, 0.25), (0.0, 0.15)]),
            ))
    }

    fn beauty(&self) -> CompositeScorer {
        CompositeScorer::new("beauty_score")
            .rule(ScoreRule::length(
                "beauty_evaluation",
                TierTable::above(&[(200.0, 0.4), (100.0, 0.3), (50.0, 0.2)]),
            ))
            .rule(ScoreRule::length(
                "balanced_decision",
                TierTable::above(&[(200.0, 0.3), (100.0, 0.2), (50.0, 0.1)]),
            ))
            // Three to six steps is the sweet spot.
            .rule(ScoreRule::count(
                "implementation_path",
                TierTable::default()
                    .then(Bound::Between(3.0, 6.0), 0.3)
                    .then(Bound::Between(2.0, 8.0), 0.2)
                    .then(Bound::AtLeast(1.0), 0.1),
            ))
    }
}

/// How evenly the decision carries both upstream scores.
fn pair_balance(compassion: f64, severity: f64, harmony: f64) -> f64 {
    if compassion < 0.3 || severity < 0.3 {
        return 0.3;
    }
    if harmony < 0.5 {
        return 0.4;
    }
    let similarity = 1.0 - (compassion - severity).abs();
    (similarity * 0.5 + harmony * 0.5).min(1.0)
}

/// How well the synthesis would carry over to other cases.
fn radiance(synthesis_len: usize, decision_len: usize) -> f64 {
    match (synthesis_len, decision_len) {
        (s, d) if s > 200 && d > 150 => 0.9,
        (s, d) if s > 150 && d > 100 => 0.75,
        (s, d) if s > 100 && d > 50 => 0.6,
        _ => 0.4,
    }
}

impl StageDefinition for Synthesis {
    fn id(&self) -> StageId {
        SYNTHESIS
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("compassion_output", FieldKind::Object).non_empty())
            .field(FieldSpec::required("boundaries_output", FieldKind::Object).non_empty())
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("synthesis")
            .text("synthesis", &["SYNTHESIS:", "SÍNTESIS:", "SINTESIS:"])
            .list(
                "conflicts_resolved",
                &["CONFLICTS RESOLVED:", "CONFLICTOS RESUELTOS:"],
            )
            .text(
                "balanced_decision",
                &["BALANCED DECISION:", "DECISIÓN BALANCEADA:", "DECISION BALANCEADA:"],
            )
            .text(
                "compassion_integration",
                &[
                    "COMPASSION INTEGRATION:",
                    "INTEGRACIÓN DE LA COMPASIÓN:",
                    "INTEGRACION DE LA COMPASION:",
                ],
            )
            .text(
                "boundaries_integration",
                &[
                    "BOUNDARIES INTEGRATION:",
                    "INTEGRACIÓN DE LOS LÍMITES:",
                    "INTEGRACION DE LOS LIMITES:",
                ],
            )
            .list(
                "implementation_path",
                &[
                    "IMPLEMENTATION PATH:",
                    "CAMINO DE IMPLEMENTACIÓN:",
                    "CAMINO DE IMPLEMENTACION:",
                ],
            )
            .text(
                "beauty_evaluation",
                &["BEAUTY EVALUATION:", "EVALUACIÓN DE BELLEZA:", "EVALUACION DE BELLEZA:"],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(1.0, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("true synthesis of compassion and boundaries")
            .require(GatePredicate::new(
                "syntheses_created",
                GateMetric::Count("syntheses_created".into()),
                Bound::AtLeast(1.0),
                "no synthesis created",
            ))
            .require(GatePredicate::new(
                "average_harmony",
                GateMetric::Average("harmony".into()),
                Bound::AtLeast(0.6),
                "low average harmony, compromise instead of synthesis",
            ))
            .require(GatePredicate::new(
                "average_balance",
                GateMetric::Average("pair_balance".into()),
                Bound::AtLeast(0.5),
                "does not integrate both compassion and boundaries",
            ))
            .require(GatePredicate::new(
                "conflicts_resolved",
                GateMetric::Count("conflicts_resolved".into()),
                Bound::AtLeast(1.0),
                "no conflicts resolved",
            ))
            .observe("average_beauty", GateMetric::Average("beauty".into()))
            .observe("radiance", GateMetric::Latest("radiance".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        let compassion = upstream(input, "compassion_output");
        let boundaries = upstream(input, "boundaries_output");
        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .note("COMPASSION ANALYSIS")
            .percent("Compassion score", compassion.score("compassion_score"))
            .percent("Expansion potential", compassion.score("expansion_potential"))
            .items("Giving opportunities", &compassion.list("giving_opportunities"), 5)
            .items("Generous actions", &compassion.list("generous_actions"), 5)
            .note("BOUNDARIES ANALYSIS")
            .percent("Severity score", boundaries.score("severity_score"))
            .percent(
                "Balance with compassion",
                boundaries.score("balance_with_compassion"),
            )
            .items("Necessary boundaries", &boundaries.list("necessary_boundaries"), 5)
            .items("Restrictions", &boundaries.list("restrictions"), 5)
            .items("Warnings", &boundaries.list("warnings"), 3)
            .respond_with(
                markers,
                &[
                    ("synthesis", "how mercy and judgment become one vision"),
                    ("conflicts_resolved", "tensions you reconcile"),
                    ("balanced_decision", "the concrete final decision"),
                    ("compassion_integration", "how the decision honours compassion"),
                    ("boundaries_integration", "how the decision honours the limits"),
                    ("implementation_path", "steps that keep the balance"),
                    ("beauty_evaluation", "elegance, simplicity and sustainability"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, input: &Payload) -> Evaluation {
        let compassion = upstream(input, "compassion_output");
        let boundaries = upstream(input, "boundaries_output");

        let harmony = self.harmony().score(record);
        let beauty = self.beauty().score(record);
        let balance = pair_balance(
            compassion.score("compassion_score"),
            boundaries.score("severity_score"),
            harmony,
        );
        let radiance = radiance(
            record.text_len("synthesis"),
            record.text_len("balanced_decision"),
        );
        let quality = if harmony > 0.7 && beauty > 0.7 {
            "high"
        } else {
            "medium"
        };

        Evaluation::new(
            ScoreSet::new()
                .with("harmony_score", harmony)
                .with("beauty_score", beauty)
                .with("compassion_boundaries_balance", balance)
                .with("radiance", radiance),
        )
        .counters(
            CounterUpdate::new()
                .count_if("syntheses_created", !record.text("synthesis").is_empty())
                .count("conflicts_resolved", record.count("conflicts_resolved") as u64)
                .total("harmony", harmony)
                .total("beauty", beauty)
                .total("pair_balance", balance)
                .latest("radiance", radiance),
        )
        .field("synthesis_quality", quality)
    }
}

/// An upstream stage's output carried as a nested object.
fn upstream(input: &Payload, key: &str) -> Payload {
    input
        .object(key)
        .cloned()
        .map(Payload::from)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::parser::parse;
    use serde_json::json;

    fn input(compassion: f64, severity: f64) -> Payload {
        Payload::new()
            .with("compassion_output", json!({"compassion_score": compassion}))
            .with("boundaries_output", json!({"severity_score": severity}))
    }

    #[test]
    fn pair_balance_needs_both_sides() {
        assert_eq!(pair_balance(0.2, 0.8, 0.9), 0.3);
        assert_eq!(pair_balance(0.6, 0.6, 0.4), 0.4);
        assert!((pair_balance(0.6, 0.5, 0.8) - 0.85).abs() < 1e-9);
    }

    #[test]
    fn radiance_tiers() {
        assert_eq!(radiance(250, 200), 0.9);
        assert_eq!(radiance(250, 120), 0.75);
        assert_eq!(radiance(120, 60), 0.6);
        assert_eq!(radiance(10, 10), 0.4);
    }

    #[test]
    fn scores_a_structured_synthesis() {
        let raw = "\
SYNTHESIS:
Access is offered generously, and it is sustained by local ownership and clear limits that protect families.
CONFLICTS RESOLVED:
- free access versus vendor dependency
- speed versus consent
BALANCED DECISION:
Run a consent-based pilot in three villages with local maintenance.
COMPASSION INTEGRATION:
Every child gets access.
BOUNDARIES INTEGRATION:
Families opt in.
IMPLEMENTATION PATH:
- sign agreements
- train local staff
- launch pilot
BEAUTY EVALUATION:
Simple.";
        let def = Synthesis;
        let record = parse(raw, &def.markers());
        let eval = def.evaluate(&record, &input(0.6, 0.6));

        // 0.15 (2 conflicts) + 0.1 (synthesis > 50) + 0.15 (both integrations present)
        assert!((eval.scores.get_or_zero("harmony_score") - 0.4).abs() < 1e-9);
        // 0.1 (decision > 50) + 0.3 (three steps)
        assert!((eval.scores.get_or_zero("beauty_score") - 0.4).abs() < 1e-9);
        assert_eq!(eval.scores.get_or_zero("compassion_boundaries_balance"), 0.4);
        assert_eq!(eval.fields.text("synthesis_quality"), "medium");
    }

    #[test]
    fn both_upstream_outputs_are_required() {
        let contract = Synthesis.contract();
        let only_one = Payload::new()
            .with("compassion_output", json!({"compassion_score": 0.5}))
            .with("boundaries_output", json!({}));
        let err = contract.validate(SYNTHESIS, &only_one).unwrap_err();
        assert_eq!(err.field(), Some("boundaries_output"));
        assert!(contract.validate(SYNTHESIS, &input(0.5, 0.5)).is_ok());
    }
}
