//! Stage 3: situates the analysis in time, society and consequences.

use crate::prompt::PromptBuilder;
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{groups_present, Bound, KeywordTally, ScoreSet};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};

pub const CONTEXT: StageId = StageId::new(3, "context");

/// Perspective dimensions, each a vocabulary of its own.
const PERSPECTIVES: &[(&str, &[&str])] = &[
    (
        "temporal",
        &[
            "histórico", "historico", "pasado", "futuro", "largo plazo", "corto plazo",
            "historical", "past", "future", "long term", "long-term", "short term",
        ],
    ),
    (
        "social",
        &["social", "comunidad", "grupo", "sociedad", "personas", "community", "society", "people"],
    ),
    (
        "economic",
        &[
            "económico", "economico", "financiero", "recursos", "costo", "incentivos",
            "economic", "financial", "resources", "cost", "incentive",
        ],
    ),
    (
        "cultural",
        &[
            "cultural", "valores", "normas", "creencias", "tradiciones", "values", "norms",
            "beliefs", "traditions",
        ],
    ),
    (
        "environmental",
        &[
            "ambiental", "ecológico", "ecologico", "sostenibilidad", "medio ambiente",
            "environmental", "ecological", "sustainability", "environment",
        ],
    ),
    (
        "political",
        &[
            "político", "politico", "poder", "gobierno", "institucional", "governance",
            "political", "power", "government", "institutional",
        ],
    ),
];

/// Markers that start an enumerated systemic effect.
const EFFECT_MARKERS: &[&str] = &["-", "*", "1.", "2."];

const MIN_ORDER_ANALYSIS_CHARS: usize = 50;

const ROLE: &str = "You are the contextual stage of an evaluation pipeline. Place the \
analysis you receive in its historical and present context, identify who is affected and \
trace first, second and third order consequences, including systemic risks and ethical \
considerations.";

#[derive(Debug, Clone, Default)]
pub struct Context;

fn perspective_groups() -> Vec<KeywordTally> {
    PERSPECTIVES
        .iter()
        .map(|(_, words)| KeywordTally::new(words, 1.0))
        .collect()
}

fn count_effects(risks: &str) -> usize {
    EFFECT_MARKERS.iter().map(|m| risks.matches(m).count()).sum()
}

impl StageDefinition for Context {
    fn id(&self) -> StageId {
        CONTEXT
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::optional("understanding", FieldKind::Text))
            .field(FieldSpec::optional("analysis", FieldKind::Text))
            .field(FieldSpec::optional("insights", FieldKind::Text))
            .field(FieldSpec::optional("query", FieldKind::Text))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("contextual_synthesis")
            .text(
                "historical_context",
                &["HISTORICAL CONTEXT", "CONTEXTO HISTÓRICO", "CONTEXTO HISTORICO"],
            )
            .text("current_context", &["CURRENT CONTEXT", "CONTEXTO ACTUAL"])
            .text("stakeholders", &["STAKEHOLDERS:", "PARTES INTERESADAS"])
            .text(
                "first_order_effects",
                &["FIRST ORDER EFFECTS", "FIRST-ORDER EFFECTS", "EFECTOS DE PRIMER ORDEN"],
            )
            .text(
                "second_order_effects",
                &["SECOND ORDER EFFECTS", "SECOND-ORDER EFFECTS", "EFECTOS DE SEGUNDO ORDEN"],
            )
            .text(
                "third_order_effects",
                &["THIRD ORDER EFFECTS", "THIRD-ORDER EFFECTS", "EFECTOS DE TERCER ORDEN"],
            )
            .text(
                "systemic_risks",
                &["SYSTEMIC RISKS", "RIESGOS SISTÉMICOS", "RIESGOS SISTEMICOS"],
            )
            .text(
                "ethical_considerations",
                &[
                    "ETHICAL CONSIDERATIONS",
                    "CONSIDERACIONES ÉTICAS",
                    "CONSIDERACIONES ETICAS",
                ],
            )
            .text(
                "contextual_synthesis",
                &["CONTEXTUAL SYNTHESIS", "SÍNTESIS CONTEXTUAL", "SINTESIS CONTEXTUAL"],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.8, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("contextual analysis is deep and plural")
            .require(GatePredicate::new(
                "depth",
                GateMetric::WeightedRatio(vec![
                    ("second_order_analyses".into(), 0.5),
                    ("third_order_analyses".into(), 0.5),
                ]),
                Bound::AtLeast(0.6),
                "shallow contextual analysis",
            ))
            .require(GatePredicate::new(
                "average_perspectives",
                GateMetric::Average("perspectives".into()),
                Bound::AtLeast(3.0),
                "limited perspectives",
            ))
            .observe("systemic_effects", GateMetric::Count("systemic_effects".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", input.text("query")))
            .field("UNDERSTANDING", input.text("understanding"))
            .field("ANALYSIS", input.text("analysis"))
            .field("INSIGHTS", input.text("insights"))
            .respond_with(
                markers,
                &[
                    ("historical_context", "how we got here"),
                    ("current_context", "the situation today"),
                    ("stakeholders", "who is affected and how"),
                    ("first_order_effects", "immediate consequences"),
                    ("second_order_effects", "consequences of the consequences"),
                    ("third_order_effects", "long-run, systemic consequences"),
                    ("systemic_risks", "enumerated risks, one per line"),
                    ("ethical_considerations", "moral tensions involved"),
                    ("contextual_synthesis", "what the context means for the decision"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let all_text = record
            .iter()
            .filter_map(|(_, value)| match value {
                cascade_core::SectionValue::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        let perspectives = groups_present(&perspective_groups(), &all_text);
        let second = record.text_len("second_order_effects") > MIN_ORDER_ANALYSIS_CHARS;
        let third = record.text_len("third_order_effects") > MIN_ORDER_ANALYSIS_CHARS;
        let effects = count_effects(record.text("systemic_risks"));
        let depth = 0.5 * f64::from(u8::from(second)) + 0.5 * f64::from(u8::from(third));

        let mut scores = ScoreSet::new().with("contextual_depth", depth);
        scores.insert_bounded(
            "perspectives_count",
            perspectives as f64,
            0.0,
            PERSPECTIVES.len() as f64,
        );

        Evaluation::new(scores)
            .counters(
                CounterUpdate::new()
                    .count_if("second_order_analyses", second)
                    .count_if("third_order_analyses", third)
                    .count("systemic_effects", effects as u64)
                    .total("perspectives", perspectives as f64),
            )
            .field("perspectives_count", perspectives)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::parser::parse;

    const RESPONSE: &str = "\
HISTORICAL CONTEXT:
Rural schools were underfunded in the past by the central government.
CURRENT CONTEXT:
Connectivity is arriving, but community trust in outside programs is low.
STAKEHOLDERS:
Teachers, parents, students and local officials.
FIRST ORDER EFFECTS:
Students gain access to tutoring.
SECOND ORDER EFFECTS:
Teachers shift from lecturing to mentoring, which changes training needs and local norms.
THIRD ORDER EFFECTS:
Over a generation, migration to cities may slow as economic opportunity grows locally.
SYSTEMIC RISKS:
- dependency on a single vendor
- erosion of local values
ETHICAL CONSIDERATIONS:
Consent of families and data protection.
CONTEXTUAL SYNTHESIS:
Worth doing with safeguards.";

    #[test]
    fn deep_response_counts_orders_and_perspectives() {
        let def = Context;
        let record = parse(RESPONSE, &def.markers());
        assert!(!record.fallback_used());
        let eval = def.evaluate(&record, &Payload::new());

        assert_eq!(eval.scores.get_or_zero("contextual_depth"), 1.0);
        // temporal, social, economic, cultural, political
        assert_eq!(eval.fields.score("perspectives_count"), 5.0);
        assert_eq!(eval.scores.get_or_zero("perspectives_count"), 5.0);
    }

    #[test]
    fn bullet_markers_count_as_systemic_effects() {
        assert_eq!(count_effects("- one\n- two\n* three"), 3);
        assert_eq!(count_effects("1. first 2. second"), 2);
        assert_eq!(count_effects(""), 0);
    }

    #[test]
    fn blank_upstream_analysis_is_accepted() {
        let contract = Context.contract();
        let degraded = Payload::new()
            .with("understanding", "")
            .with("analysis", "")
            .with("insights", "");
        assert!(contract.validate(CONTEXT, &degraded).is_ok());
        assert!(contract
            .validate(CONTEXT, &Payload::new().with("analysis", 3))
            .is_err());
    }
}
