//! Stage 4: where the action can give, to whom, and where giving must stop.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord, SubKeySpec};
use cascade_core::scoring::{Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};
use tracing::warn;

pub const COMPASSION: StageId = StageId::new(4, "compassion");

const ROLE: &str = "You are the compassion stage of an evaluation pipeline. Identify \
concrete opportunities to help, relieve suffering and expand what is good, treating every \
affected party with dignity. Kindness must not create dependency, excuse ongoing injustice \
or become unsustainable, so also name the limits generosity has to respect.";

#[derive(Debug, Clone, Default)]
pub struct Compassion;

impl Compassion {
    fn compassion(&self) -> CompositeScorer {
        let items = || TierTable::at_least(&[(5.0, 0.3), (3.0, 0.2), (1.0, 0.1)]);
        CompositeScorer::new("compassion_score")
            .rule(ScoreRule::count("giving_opportunities", items()))
            .rule(ScoreRule::count("generous_actions", items()))
            .rule(ScoreRule::length(
                "compassion_impact",
                TierTable::above(&[(300.0, 0.4), (150.0, 0.3), (50.0, 0.2)]),
            ))
    }

    fn expansion(&self) -> CompositeScorer {
        CompositeScorer::new("expansion_potential")
            .rule(ScoreRule::length(
                "expansion_analysis",
                TierTable::above(&[(300.0, 0.5), (150.0, 0.3), (50.0, 0.2)]),
            ))
            .rule(ScoreRule::nested_count(
                "beneficiaries",
                "secondary",
                TierTable::at_least(&[(1.0, 0.2)]),
            ))
            .rule(ScoreRule::nested_count(
                "beneficiaries",
                "tertiary",
                TierTable::at_least(&[(1.0, 0.3)]),
            ))
    }

    /// Whether the stage recognizes where it has to hold back.
    fn balance_awareness(&self) -> CompositeScorer {
        CompositeScorer::new("balance_awareness_score").rule(ScoreRule::count(
            "limits_needed",
            TierTable::at_least(&[(3.0, 0.9), (2.0, 0.7), (1.0, 0.5)]).or_else(0.2),
        ))
    }
}

impl StageDefinition for Compassion {
    fn id(&self) -> StageId {
        COMPASSION
    }

    fn contract(&self) -> InputContract {
        // Stakeholders must be present but may be empty.
        InputContract::new()
            .field(FieldSpec::required("stakeholders", FieldKind::Text))
            .field(FieldSpec::optional("first_order_effects", FieldKind::Text))
            .field(FieldSpec::optional("second_order_effects", FieldKind::Text))
            .field(FieldSpec::optional("systemic_risks", FieldKind::Text))
            .field(FieldSpec::optional("ethical_considerations", FieldKind::Text))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("compassion_impact")
            .list(
                "giving_opportunities",
                &["GIVING OPPORTUNITIES:", "OPORTUNIDADES DE DAR:"],
            )
            .nested(
                "beneficiaries",
                &["BENEFICIARIES:", "BENEFICIARIOS:"],
                vec![
                    SubKeySpec::new("primary", &["Primary:", "Primarios:"]),
                    SubKeySpec::new("secondary", &["Secondary:", "Secundarios:"]),
                    SubKeySpec::new(
                        "tertiary",
                        &["Long term:", "Long-term:", "Largo plazo:", "Tertiary:"],
                    ),
                ],
            )
            .list("generous_actions", &["GENEROUS ACTIONS:", "ACCIONES GENEROSAS:"])
            .text("compassion_impact", &["COMPASSION IMPACT:", "IMPACTO DE BONDAD:"])
            .text(
                "expansion_analysis",
                &[
                    "EXPANSION OF GOOD:",
                    "EXPANSION ANALYSIS:",
                    "EXPANSIÓN DEL BIEN:",
                    "EXPANSION DEL BIEN:",
                ],
            )
            .list(
                "limits_needed",
                &["NECESSARY LIMITS:", "LÍMITES NECESARIOS:", "LIMITES NECESARIOS:"],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.9, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("compassion aware of its limits")
            .require(GatePredicate::new(
                "giving_opportunities",
                GateMetric::Count("giving_opportunities".into()),
                Bound::AtLeast(1.0),
                "no giving opportunities identified, possible indifference",
            ))
            .require(GatePredicate::new(
                "balance_awareness",
                GateMetric::Latest("balance_awareness".into()),
                Bound::AtLeast(0.4),
                "low balance awareness, risk of unchecked generosity",
            ))
            .require(GatePredicate::new(
                "limits_recognized",
                GateMetric::Count("limits_recognized".into()),
                Bound::AtLeast(1.0),
                "never recognized its own limits",
            ))
            .observe(
                "average_expansion_potential",
                GateMetric::Average("expansion_potential".into()),
            )
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .field("STAKEHOLDERS", input.text("stakeholders"))
            .field("IMMEDIATE EFFECTS", input.text("first_order_effects"))
            .field("SECOND ORDER EFFECTS", input.text("second_order_effects"))
            .field("SYSTEMIC RISKS", input.text("systemic_risks"))
            .field("ETHICAL CONSIDERATIONS", input.text("ethical_considerations"))
            .respond_with(
                markers,
                &[
                    ("giving_opportunities", "specific ways to help or relieve suffering"),
                    ("primary", "who benefits directly"),
                    ("secondary", "who benefits indirectly"),
                    ("tertiary", "who benefits in the future"),
                    ("generous_actions", "concrete acts of kindness"),
                    ("compassion_impact", "suffering reduced and flourishing gained"),
                    ("expansion_analysis", "how the good multiplies"),
                    ("limits_needed", "where generosity must hold back"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let compassion = self.compassion().score(record);
        let expansion = self.expansion().score(record);
        let balance = self.balance_awareness().score(record);
        let limits = record.count("limits_needed");
        if limits == 0 {
            warn!(stage = COMPASSION.name, "no limits recognized, risk of destructive kindness");
        }

        Evaluation::new(
            ScoreSet::new()
                .with("compassion_score", compassion)
                .with("expansion_potential", expansion)
                .with("balance_awareness_score", balance),
        )
        .counters(
            CounterUpdate::new()
                .count("giving_opportunities", record.count("giving_opportunities") as u64)
                .count("generous_actions", record.count("generous_actions") as u64)
                .count("limits_recognized", limits as u64)
                .total("expansion_potential", expansion)
                .latest("balance_awareness", balance),
        )
    }
}
