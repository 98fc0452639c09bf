//! Stage 7: how the balanced decision survives obstacles over time.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};

pub const PERSISTENCE: StageId = StageId::new(7, "persistence");

const ROLE: &str = "You are the persistence stage of an evaluation pipeline. A balanced \
decision has been reached. Work out how it will survive resistance, fatigue and setbacks: \
name the obstacles, the conditions of victory and the mechanisms that keep momentum.";

#[derive(Debug, Clone, Default)]
pub struct Persistence;

impl Persistence {
    fn sustainability(&self) -> CompositeScorer {
        CompositeScorer::new("sustainability_score")
            .rule(ScoreRule::length(
                "endurance_plan",
                TierTable::above(&[(300.0, 0.35), (150.0, 0.25), (50.0, 0.15)]),
            ))
            .rule(ScoreRule::count(
                "momentum_mechanisms",
                TierTable::at_least(&[(5.0, 0.35), (3.0, 0.25), (1.0, 0.15)]),
            ))
            .rule(ScoreRule::length(
                "sustainability_evaluation",
                TierTable::above(&[(200.0, 0.3), (100.0, 0.2), (50.0, 0.1)]),
            ))
    }

    fn victory(&self) -> CompositeScorer {
        CompositeScorer::new("victory_probability")
            .base(0.5)
            .rule(ScoreRule::count(
                "victory_conditions",
                TierTable::at_least(&[(4.0, 0.2), (2.0, 0.1)]),
            ))
            .rule(ScoreRule::count(
                "obstacles_identified",
                TierTable::at_least(&[(4.0, 0.15), (2.0, 0.1)]),
            ))
            .rule(ScoreRule::length(
                "persistence_strategy",
                TierTable::above(&[(200.0, 0.15), (100.0, 0.1)]),
            ))
    }
}

fn endurance(plan_len: usize, momentum: usize) -> f64 {
    match (plan_len, momentum) {
        (p, m) if p > 250 && m >= 4 => 0.9,
        (p, m) if p > 150 && m >= 3 => 0.75,
        (p, m) if p > 100 && m >= 2 => 0.6,
        _ => 0.4,
    }
}

impl StageDefinition for Persistence {
    fn id(&self) -> StageId {
        PERSISTENCE
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("balanced_decision", FieldKind::Text))
            .field(FieldSpec::optional("implementation_path", FieldKind::List))
            .field(FieldSpec::optional("harmony_score", FieldKind::Score))
            .field(FieldSpec::optional("beauty_score", FieldKind::Score))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("persistence_strategy")
            .text(
                "persistence_strategy",
                &["PERSISTENCE STRATEGY:", "ESTRATEGIA DE PERSISTENCIA:"],
            )
            .list(
                "obstacles_identified",
                &[
                    "OBSTACLES IDENTIFIED:",
                    "OBSTACLES:",
                    "OBSTÁCULOS IDENTIFICADOS:",
                    "OBSTACULOS IDENTIFICADOS:",
                ],
            )
            .list(
                "victory_conditions",
                &["VICTORY CONDITIONS:", "CONDICIONES DE VICTORIA:"],
            )
            .text("endurance_plan", &["ENDURANCE PLAN:", "PLAN DE RESISTENCIA:"])
            .list(
                "momentum_mechanisms",
                &["MOMENTUM MECHANISMS:", "MECANISMOS DE MOMENTUM:", "MECANISMOS DE IMPULSO:"],
            )
            .text(
                "sustainability_evaluation",
                &[
                    "SUSTAINABILITY EVALUATION:",
                    "EVALUACIÓN DE SOSTENIBILIDAD:",
                    "EVALUACION DE SOSTENIBILIDAD:",
                ],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.85, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("strategy that endures")
            .require(GatePredicate::new(
                "strategies_developed",
                GateMetric::Count("strategies_developed".into()),
                Bound::AtLeast(1.0),
                "no persistence strategy developed",
            ))
            .require(GatePredicate::new(
                "obstacles_anticipated",
                GateMetric::Count("obstacles_anticipated".into()),
                Bound::AtLeast(1.0),
                "no obstacles anticipated, naive optimism",
            ))
            .require(GatePredicate::new(
                "average_sustainability",
                GateMetric::Average("sustainability".into()),
                Bound::AtLeast(0.5),
                "low sustainability",
            ))
            .require(GatePredicate::new(
                "victory_conditions",
                GateMetric::Count("victory_conditions".into()),
                Bound::AtLeast(1.0),
                "no victory conditions defined",
            ))
            .observe("endurance", GateMetric::Latest("endurance".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .field("BALANCED DECISION", input.text("balanced_decision"))
            .items("IMPLEMENTATION PATH", &input.list("implementation_path"), 10)
            .percent("HARMONY", input.score("harmony_score"))
            .percent("BEAUTY", input.score("beauty_score"))
            .respond_with(
                markers,
                &[
                    ("persistence_strategy", "how the decision is carried through"),
                    ("obstacles_identified", "resistance, fatigue and setbacks to expect"),
                    ("victory_conditions", "what counts as success"),
                    ("endurance_plan", "how effort is sustained over time"),
                    ("momentum_mechanisms", "what keeps progress going"),
                    ("sustainability_evaluation", "whether the effort can last"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let sustainability = self.sustainability().score(record);
        let victory = self.victory().score(record);
        let endurance = endurance(
            record.text_len("endurance_plan"),
            record.count("momentum_mechanisms"),
        );

        Evaluation::new(
            ScoreSet::new()
                .with("sustainability_score", sustainability)
                .with("victory_probability", victory)
                .with("endurance_level", endurance),
        )
        .counters(
            CounterUpdate::new()
                .count_if(
                    "strategies_developed",
                    !record.text("persistence_strategy").is_empty(),
                )
                .count("obstacles_anticipated", record.count("obstacles_identified") as u64)
                .count("victory_conditions", record.count("victory_conditions") as u64)
                .count("momentum_mechanisms", record.count("momentum_mechanisms") as u64)
                .total("sustainability", sustainability)
                .latest("endurance", endurance),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::metrics::MetricsTracker;
    use cascade_core::parser::parse;
    use std::time::Duration;

    #[test]
    fn endurance_needs_plan_and_momentum() {
        assert_eq!(endurance(300, 4), 0.9);
        assert_eq!(endurance(300, 3), 0.75);
        assert_eq!(endurance(120, 2), 0.6);
        assert_eq!(endurance(500, 1), 0.4);
    }

    #[test]
    fn scores_strategy() {
        let raw = "\
PERSISTENCE STRATEGY:
Start small and grow with each school that joins.
OBSTACLES IDENTIFIED:
- funding gaps
- teacher turnover
VICTORY CONDITIONS:
- literacy improves
MOMENTUM MECHANISMS:
- monthly showcases
- peer mentoring
- public dashboard
ENDURANCE PLAN:
Rotate coordinators every term and keep a reserve fund for the lean months.";
        let def = Persistence;
        let record = parse(raw, &def.markers());
        let eval = def.evaluate(&record, &Payload::new());

        // 0.15 (plan > 50) + 0.25 (three mechanisms)
        assert!((eval.scores.get_or_zero("sustainability_score") - 0.4).abs() < 1e-9);
        // 0.5 + 0.1 (two obstacles)
        assert!((eval.scores.get_or_zero("victory_probability") - 0.6).abs() < 1e-9);
        assert_eq!(eval.scores.get_or_zero("endurance_level"), 0.4);

        let mut tracker = MetricsTracker::new();
        tracker.record_success(Duration::ZERO, "payload", "plan", &eval.counters);
        assert_eq!(tracker.counter("obstacles_anticipated"), 2);
        assert_eq!(tracker.counter("strategies_developed"), 1);
    }

    #[test]
    fn decision_must_be_present() {
        let contract = Persistence.contract();
        assert!(contract.validate(PERSISTENCE, &Payload::new()).is_err());
        assert!(contract
            .validate(PERSISTENCE, &Payload::new().with("balanced_decision", "pilot"))
            .is_ok());
    }
}
