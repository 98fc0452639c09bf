//! Stage 5: the limits, justice criteria and warnings that temper compassion.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{BalanceBands, Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};

pub const BOUNDARIES: StageId = StageId::new(5, "boundaries");

const ROLE: &str = "You are the boundaries stage of an evaluation pipeline. Review the \
compassion analysis you receive with rigour: find where kindness is excessive or \
unsustainable, set the limits and restrictions that must apply, state the justice \
criteria (merit, responsibility, reciprocity) and warn about what happens without them.";

#[derive(Debug, Clone, Default)]
pub struct Boundaries {
    bands: BalanceBands,
}

impl Boundaries {
    fn severity(&self) -> CompositeScorer {
        let items = || TierTable::at_least(&[(5.0, 0.35), (3.0, 0.25), (1.0, 0.15)]);
        CompositeScorer::new("severity_score")
            .rule(ScoreRule::count("necessary_boundaries", items()))
            .rule(ScoreRule::count("restrictions", items()))
            .rule(ScoreRule::count(
                "warnings",
                TierTable::at_least(&[(3.0, 0.3), (2.0, 0.2), (1.0, 0.1)]),
            ))
    }
}

impl StageDefinition for Boundaries {
    fn id(&self) -> StageId {
        BOUNDARIES
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("compassion_score", FieldKind::Score))
            .field(FieldSpec::optional("giving_opportunities", FieldKind::List))
            .field(FieldSpec::optional("beneficiaries", FieldKind::Object))
            .field(FieldSpec::optional("generous_actions", FieldKind::List))
            .field(FieldSpec::optional("expansion_potential", FieldKind::Score))
            .field(FieldSpec::optional("limits_needed", FieldKind::List))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("balance_analysis")
            .list(
                "excesses",
                &[
                    "EXCESSES OF COMPASSION:",
                    "COMPASSION EXCESSES:",
                    "EXCESOS DE COMPASIÓN:",
                    "EXCESOS DE COMPASION:",
                    "EXCESOS DE BONDAD:",
                ],
            )
            .list(
                "necessary_boundaries",
                &[
                    "NECESSARY BOUNDARIES:",
                    "NECESSARY LIMITS:",
                    "LÍMITES NECESARIOS:",
                    "LIMITES NECESARIOS:",
                ],
            )
            .list("justice_criteria", &["JUSTICE CRITERIA:", "CRITERIOS DE JUSTICIA:"])
            .list("restrictions", &["RESTRICTIONS:", "RESTRICCIONES:"])
            .list("warnings", &["WARNINGS:", "ADVERTENCIAS:"])
            .text(
                "balance_analysis",
                &["REQUIRED BALANCE:", "BALANCE ANALYSIS:", "BALANCE REQUERIDO:"],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.7, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("boundaries balanced with compassion")
            .require(GatePredicate::new(
                "boundaries_identified",
                GateMetric::Count("boundaries_identified".into()),
                Bound::AtLeast(1.0),
                "no boundaries applied, possible passivity",
            ))
            .require(GatePredicate::new(
                "balance_with_compassion",
                GateMetric::Latest("balance_with_compassion".into()),
                Bound::AtLeast(0.3),
                "out of balance with compassion, severity excessive or insufficient",
            ))
            .require(GatePredicate::new(
                "warnings_issued",
                GateMetric::Count("warnings_issued".into()),
                Bound::AtLeast(1.0),
                "no warnings issued",
            ))
            .observe("average_severity", GateMetric::Average("severity".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        let beneficiaries = input
            .object("beneficiaries")
            .map(|groups| {
                groups
                    .iter()
                    .map(|(group, items)| {
                        let names: Vec<&str> = items
                            .as_array()
                            .map(|a| a.iter().filter_map(|v| v.as_str()).take(3).collect())
                            .unwrap_or_default();
                        format!("{}: {}", group, names.join(", "))
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .percent("COMPASSION SCORE", input.score("compassion_score"))
            .items("GIVING OPPORTUNITIES", &input.list("giving_opportunities"), 10)
            .items("BENEFICIARIES", &beneficiaries, 3)
            .items("GENEROUS ACTIONS", &input.list("generous_actions"), 10)
            .percent("EXPANSION POTENTIAL", input.score("expansion_potential"))
            .items("LIMITS SUGGESTED BY COMPASSION", &input.list("limits_needed"), 10)
            .respond_with(
                markers,
                &[
                    ("excesses", "where kindness is excessive or counterproductive"),
                    ("necessary_boundaries", "concrete boundaries to apply"),
                    ("justice_criteria", "merit, responsibility, reciprocity"),
                    ("restrictions", "specific conditions and limitations"),
                    ("warnings", "risks if these limits are not applied"),
                    ("balance_analysis", "how to balance compassion with judgment"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, input: &Payload) -> Evaluation {
        let severity = self.severity().score(record);
        let balance = self.bands.score(input.score("compassion_score"), severity);
        let boundaries = record.count("necessary_boundaries");

        Evaluation::new(
            ScoreSet::new()
                .with("severity_score", severity)
                .with("balance_with_compassion", balance),
        )
        .counters(
            CounterUpdate::new()
                .count("boundaries_identified", boundaries as u64)
                .count("restrictions_applied", record.count("restrictions") as u64)
                .count("justice_requirements", record.count("justice_criteria") as u64)
                .count("warnings_issued", record.count("warnings") as u64)
                .total("severity", severity)
                .latest("balance_with_compassion", balance),
        )
    }
}
