//! Stage 9: checks the plan against reality and fixes the first concrete steps.

use crate::prompt::PromptBuilder;
use crate::text::{split_labeled, truncate};
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord, SectionValue, SubKeySpec};
use cascade_core::scoring::{clamp_unit, Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::info;

pub const FOUNDATION: StageId = StageId::new(9, "foundation");

/// Readiness from which the plan is handed over for execution.
pub const READY_THRESHOLD: f64 = 0.75;

const RESOURCE_GROUPS: &[&str] = &["budget", "personnel", "infrastructure"];

lazy_static! {
    static ref WEEK: Regex = Regex::new(r"(?i)\b(?:week|semana)\s*(\d+)").unwrap();
    static ref WEEK_PREFIX: Regex =
        Regex::new(r"(?i)^(?:week|semana)\s*\d+\s*[:\-.)]?\s*").unwrap();
}

const ROLE: &str = "You are the foundation stage of an evaluation pipeline. Before anything \
is executed, ground the structured plan in reality: what is solid, what is missing, which \
resources it needs, where each stakeholder stands and which concrete steps happen first.";

#[derive(Debug, Clone, Default)]
pub struct Foundation;

impl Foundation {
    fn solidity(&self) -> CompositeScorer {
        CompositeScorer::new("foundation_solidity")
            .rule(ScoreRule::count(
                "strengths",
                TierTable::at_least(&[(3.0, 0.4), (2.0, 0.3), (1.0, 0.2)]),
            ))
            // Naming gaps is part of a solid foundation.
            .rule(ScoreRule::count("gaps", TierTable::at_least(&[(1.0, 0.2)])))
            .rule(ScoreRule::length(
                "readiness_evaluation",
                TierTable::above(&[(100.0, 0.4), (50.0, 0.2)]),
            ))
    }
}

/// Steps with the week they start in; unnumbered steps take their position.
fn concrete_steps(items: &[String]) -> Vec<Value> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let week = WEEK
                .captures(item)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(i as u32 + 1);
            let action = WEEK_PREFIX.replace(item, "");
            json!({ "action": truncate(action.trim(), 300), "week": week })
        })
        .collect()
}

/// `Stakeholder: status` items keyed by lower-cased stakeholder.
fn alignment(items: &[String]) -> Map<String, Value> {
    items
        .iter()
        .map(|item| match split_labeled(item) {
            Some((name, status)) => (name.to_lowercase(), status.to_string()),
            None => (item.to_lowercase(), "unspecified".to_string()),
        })
        .map(|(name, status)| (name, json!({ "status": status })))
        .collect()
}

fn readiness(
    solidity: f64,
    steps: usize,
    concrete: usize,
    resource_groups: usize,
    stakeholders: usize,
) -> f64 {
    let steps = TierTable::at_least(&[(5.0, 0.3), (3.0, 0.2), (1.0, 0.1)]).eval_count(steps);
    let concrete = TierTable::at_least(&[(3.0, 0.2), (1.0, 0.1)]).eval_count(concrete);
    let stakeholders = if stakeholders > 0 { 0.05 } else { 0.0 };
    clamp_unit(0.3 * solidity + steps + concrete + 0.05 * resource_groups as f64 + stakeholders)
}

impl StageDefinition for Foundation {
    fn id(&self) -> StageId {
        FOUNDATION
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("structured_plan", FieldKind::Object))
            .field(FieldSpec::optional("communication_strategy", FieldKind::Object))
            .field(FieldSpec::optional("metrics_framework", FieldKind::Object))
            .field(FieldSpec::optional("documentation", FieldKind::List))
            .field(FieldSpec::optional("stakeholder_messages", FieldKind::Object))
            .field(FieldSpec::optional("precision_score", FieldKind::Score))
            .field(FieldSpec::optional("clarity_score", FieldKind::Score))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("readiness_evaluation")
            .list("strengths", &["STRENGTHS:", "FORTALEZAS:"])
            .list("gaps", &["GAPS:", "WEAKNESSES:", "BRECHAS:", "DEBILIDADES:"])
            .text(
                "reality_connection",
                &[
                    "REALITY CONNECTION:",
                    "CONEXIÓN CON LA REALIDAD:",
                    "CONEXION CON LA REALIDAD:",
                ],
            )
            .list(
                "concrete_elements",
                &["CONCRETE ELEMENTS:", "ELEMENTOS CONCRETOS:"],
            )
            .list(
                "first_steps",
                &[
                    "FIRST CONCRETE STEPS:",
                    "FIRST STEPS:",
                    "PRIMEROS PASOS CONCRETOS:",
                    "PRIMEROS PASOS:",
                ],
            )
            .nested(
                "resources",
                &[
                    "RESOURCE REQUIREMENTS:",
                    "RESOURCES:",
                    "REQUISITOS DE RECURSOS:",
                    "RECURSOS:",
                ],
                vec![
                    SubKeySpec::new("budget", &["Budget:", "Presupuesto:"]),
                    SubKeySpec::new("personnel", &["Personnel:", "Staff:", "Personal:"]),
                    SubKeySpec::new("infrastructure", &["Infrastructure:", "Infraestructura:"]),
                ],
            )
            .list(
                "stakeholder_alignment",
                &[
                    "STAKEHOLDER ALIGNMENT:",
                    "ALINEACIÓN DE STAKEHOLDERS:",
                    "ALINEACION DE STAKEHOLDERS:",
                ],
            )
            .text(
                "readiness_evaluation",
                &[
                    "READINESS EVALUATION:",
                    "EVALUACIÓN DE PREPARACIÓN:",
                    "EVALUACION DE PREPARACION:",
                ],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.6, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("grounded and ready to manifest")
            .require(GatePredicate::new(
                "foundations_validated",
                GateMetric::Count("foundations_validated".into()),
                Bound::AtLeast(1.0),
                "no foundations validated",
            ))
            .require(GatePredicate::new(
                "reality_connections",
                GateMetric::Count("reality_connections".into()),
                Bound::AtLeast(1.0),
                "no connection to reality",
            ))
            .require(GatePredicate::new(
                "average_readiness",
                GateMetric::Average("readiness".into()),
                Bound::AtLeast(0.6),
                "low readiness to manifest",
            ))
            .require(GatePredicate::new(
                "steps_defined",
                GateMetric::Count("steps_defined".into()),
                Bound::AtLeast(1.0),
                "no concrete steps defined",
            ))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        let phases: Vec<String> = input
            .object("structured_plan")
            .map(|plan| {
                plan.iter()
                    .map(|(key, phase)| {
                        let content = phase.get("content").and_then(Value::as_str).unwrap_or("");
                        format!("{}: {}", key, truncate(content, 200))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let kpis: Vec<String> = input
            .object("metrics_framework")
            .and_then(|m| m.get("kpis"))
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();

        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .items("STRUCTURED PLAN", &phases, 10)
            .items("KPIS", &kpis, 10)
            .items("DOCUMENTATION", &input.list("documentation"), 10)
            .percent("PRECISION", input.score("precision_score"))
            .percent("CLARITY", input.score("clarity_score"))
            .respond_with(
                markers,
                &[
                    ("strengths", "what is already solid"),
                    ("gaps", "what is missing or fragile"),
                    ("reality_connection", "how the plan meets real conditions"),
                    ("concrete_elements", "tangible things that must exist"),
                    ("first_steps", "Week 1: ... one step per line"),
                    ("budget", "money needed"),
                    ("personnel", "people needed"),
                    ("infrastructure", "places and tools needed"),
                    ("stakeholder_alignment", "Stakeholder: status"),
                    ("readiness_evaluation", "is the plan ready to execute"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, input: &Payload) -> Evaluation {
        let solidity = self.solidity().score(record);
        let steps = concrete_steps(record.list("first_steps"));
        let stakeholders = alignment(record.list("stakeholder_alignment"));
        let resource_groups = RESOURCE_GROUPS
            .iter()
            .filter(|group| !record.nested("resources", group).is_empty())
            .count();
        let readiness = readiness(
            solidity,
            steps.len(),
            record.count("concrete_elements"),
            resource_groups,
            stakeholders.len(),
        );
        let integration =
            (input.score("precision_score") + input.score("clarity_score") + readiness) / 3.0;
        let ready = readiness >= READY_THRESHOLD && !steps.is_empty();
        if ready {
            info!(stage = FOUNDATION.name, readiness, steps = steps.len(), "ready to manifest");
        }

        let resources = record
            .get("resources")
            .map(SectionValue::to_value)
            .unwrap_or_else(|| json!({}));
        let reality = json!({
            "description": record.text("reality_connection"),
            "concrete_elements": record.list("concrete_elements"),
        });
        let assessment = json!({
            "solidity": solidity,
            "gaps": record.list("gaps"),
            "strengths": record.list("strengths"),
        });

        Evaluation::new(
            ScoreSet::new()
                .with("foundation_solidity", solidity)
                .with("manifestation_readiness", readiness)
                .with("integration_score", integration),
        )
        .counters(
            CounterUpdate::new()
                .count_if("foundations_validated", solidity > 0.0)
                .count_if(
                    "reality_connections",
                    !record.text("reality_connection").is_empty(),
                )
                .count("steps_defined", steps.len() as u64)
                .total("readiness", readiness),
        )
        .field("first_concrete_steps", steps)
        .field("stakeholder_alignment", stakeholders)
        .field("resource_requirements", resources)
        .field("reality_connection", reality)
        .field("foundation_assessment", assessment)
        .field("ready_to_manifest", ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::parser::parse;

    const RESPONSE: &str = "\
STRENGTHS:
- committed teachers
- signed agreements
- existing connectivity
GAPS:
- no maintenance budget
REALITY CONNECTION:
Three villages already have power and a classroom each.
CONCRETE ELEMENTS:
- 30 tablets
- one shared server
- a training room
FIRST CONCRETE STEPS:
- Week 1: sign consent forms
- Semana 2 - train two teachers
- install the server
- Week 4: first class
- review attendance
RESOURCE REQUIREMENTS:
Budget: 20,000 for the first year
Staff: two coordinators
STAKEHOLDER ALIGNMENT:
- Parents: supportive
- Ministry: pending approval
READINESS EVALUATION:
The plan is grounded, staffed and funded for its first term, with a clear fallback if the pilot stalls.";

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn steps_carry_weeks() {
        let steps = concrete_steps(&strings(&["Week 3: launch", "call parents", "semana 5) review"]));
        assert_eq!(steps[0], json!({"action": "launch", "week": 3}));
        assert_eq!(steps[1], json!({"action": "call parents", "week": 2}));
        assert_eq!(steps[2], json!({"action": "review", "week": 5}));
    }

    #[test]
    fn alignment_keys_are_lowercase() {
        let map = alignment(&strings(&["Ministry of Education: pending", "unions"]));
        assert_eq!(map["ministry of education"]["status"], "pending");
        assert_eq!(map["unions"]["status"], "unspecified");
    }

    #[test]
    fn grounded_plan_is_ready() {
        let def = Foundation;
        let record = parse(RESPONSE, &def.markers());
        let input = Payload::new()
            .with("precision_score", 0.7)
            .with("clarity_score", 0.5);
        let eval = def.evaluate(&record, &input);

        // 0.4 + 0.2 + 0.4
        assert!((eval.scores.get_or_zero("foundation_solidity") - 1.0).abs() < 1e-9);
        // 0.3 + 0.3 (5 steps) + 0.2 (3 elements) + 0.1 (2 resource groups) + 0.05
        let readiness = eval.scores.get_or_zero("manifestation_readiness");
        assert!((readiness - 0.95).abs() < 1e-9);
        assert!(eval.fields.flag("ready_to_manifest"));
        let integration = eval.scores.get_or_zero("integration_score");
        assert!((integration - (0.7 + 0.5 + 0.95) / 3.0).abs() < 1e-9);

        let resources = eval.fields.object("resource_requirements").unwrap();
        assert_eq!(resources["personnel"], json!(["two coordinators"]));
        assert_eq!(
            eval.fields.get("first_concrete_steps").unwrap()[1],
            json!({"action": "train two teachers", "week": 2})
        );
    }

    #[test]
    fn no_steps_means_not_ready() {
        let def = Foundation;
        let record = parse(
            "STRENGTHS:\n- a\n- b\n- c\nGAPS:\n- d\nCONCRETE ELEMENTS:\n- x\n- y\n- z",
            &def.markers(),
        );
        let eval = def.evaluate(&record, &Payload::new());
        assert!(!eval.fields.flag("ready_to_manifest"));
    }

    #[test]
    fn plan_is_required() {
        let contract = Foundation.contract();
        assert!(contract.validate(FOUNDATION, &Payload::new()).is_err());
        assert!(contract
            .validate(FOUNDATION, &Payload::new().with("structured_plan", json!({})))
            .is_ok());
    }
}
