//! Stage 2: open-ended analysis of the query with a calibrated confidence.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{
    clamp_unit, Bound, CompositeScorer, KeywordTally, ScoreRule, ScoreSet, TierTable,
};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};

pub const REASONING: StageId = StageId::new(2, "reasoning");

const DEFAULT_OBJECTIVE: &str = "maximize the repair and flourishing of the world";

const DEFINITIVE: &[&str] = &[
    "definitivo", "claro", "preciso", "sin ambig", "clear", "definitive", "precise", "certain",
    "obviously",
];

const HEDGING: &[&str] = &[
    "maybe", "perhaps", "possibly", "might", "could be", "not sure", "unclear",
    "difficult to determine", "tal vez", "posiblemente", "quizá", "quiza", "podría", "podria",
];

const MORE_INFO: &[&str] = &[
    "need more information", "require additional", "would help to know", "necesito más",
    "necesito mas", "requiero más", "requiero mas",
];

const MORE_INFO_PENALTY: f64 = 0.1;

const ROLE: &str = "You are the analytical stage of an evaluation pipeline. Understand the \
query in depth, analyse it from first principles, surface non-obvious insights and state \
plainly what remains uncertain.";

#[derive(Debug, Clone, Default)]
pub struct Reasoning;

impl Reasoning {
    fn confidence(&self) -> CompositeScorer {
        CompositeScorer::new("confidence_level")
            .base(0.5)
            .rule(ScoreRule::length(
                "insights",
                TierTable::above(&[(200.0, 0.25), (100.0, 0.2), (50.0, 0.1)])
                    .then(Bound::Below(30.0), -0.1),
            ))
            .rule(ScoreRule::length(
                "uncertainties",
                TierTable::above(&[(150.0, -0.2), (50.0, -0.1)]).then(Bound::Below(10.0), 0.2),
            ))
            .rule(ScoreRule::keywords("analysis", DEFINITIVE, 0.05))
            .rule(ScoreRule::keywords("analysis", HEDGING, -0.05))
            // Clamped after the more-information penalty.
            .bounds(f64::NEG_INFINITY, f64::INFINITY)
    }
}

impl StageDefinition for Reasoning {
    fn id(&self) -> StageId {
        REASONING
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("query", FieldKind::Text).non_empty())
            .field(FieldSpec::optional("context", FieldKind::Text))
            .field(FieldSpec::optional("objective", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("analysis")
            .text("understanding", &["UNDERSTANDING:", "COMPRENSIÓN:", "COMPRENSION:"])
            .text("analysis", &["ANALYSIS:", "ANÁLISIS:", "ANALISIS:"])
            .text("insights", &["INSIGHTS:", "PERCEPCIONES:", "HALLAZGOS:"])
            .text("uncertainties", &["UNCERTAINTIES:", "INCERTIDUMBRES:"])
            .text(
                "recommendation",
                &["RECOMMENDATION:", "RECOMENDACIÓN:", "RECOMENDACION:"],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(1.0, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("reasoning acknowledges uncertainty")
            .require(GatePredicate::new(
                "uncertainty_acknowledgment_rate",
                GateMetric::Ratio("uncertainty_acknowledgments".into()),
                Bound::Above(0.0),
                "never acknowledged uncertainty, possible overconfidence",
            ))
            .observe("high_confidence_rate", GateMetric::Ratio("high_confidence".into()))
            .observe(
                "more_info_rate",
                GateMetric::Ratio("requests_for_more_info".into()),
            )
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        PromptBuilder::new(ROLE)
            .field("QUERY", input.text("query"))
            .field("CONTEXT", input.text("context"))
            .field("OBJECTIVE", input.text_or("objective", DEFAULT_OBJECTIVE))
            .respond_with(
                markers,
                &[
                    ("understanding", "what is really being asked"),
                    ("analysis", "reasoning from first principles"),
                    ("insights", "non-obvious conclusions"),
                    ("uncertainties", "what you do not know and why"),
                    ("recommendation", "what to do next"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let needs_more_info = KeywordTally::new(MORE_INFO, 1.0).any(record.text("uncertainties"));
        let mut confidence = self.confidence().score(record);
        if needs_more_info {
            confidence -= MORE_INFO_PENALTY;
        }
        let confidence = clamp_unit(confidence);

        Evaluation::new(ScoreSet::new().with("confidence_level", confidence))
            .counters(
                CounterUpdate::new()
                    .count_if(
                        "uncertainty_acknowledgments",
                        record.text_len("uncertainties") > 20,
                    )
                    .count_if("high_confidence", confidence > 0.8)
                    .count_if("requests_for_more_info", needs_more_info),
            )
            .field("needs_more_info", needs_more_info)
    }
}
