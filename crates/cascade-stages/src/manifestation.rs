//! Stage 10: records what was executed and what feeds the next cycle.

use crate::prompt::PromptBuilder;
use crate::text::{split_labeled, truncate};
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{Bound, CompositeScorer, ScoreRule, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use tracing::info;

pub const MANIFESTATION: StageId = StageId::new(10, "manifestation");

pub const COMPLETE_THRESHOLD: f64 = 0.75;

const ROLE: &str = "You are the manifestation stage of an evaluation pipeline. The plan \
has been grounded and its first steps fixed. Describe the execution: which actions were \
taken, what they achieved, how the world changed, who is responsible for what and what \
comes next.";

#[derive(Debug, Clone, Default)]
pub struct Manifestation;

impl Manifestation {
    fn completion(&self) -> CompositeScorer {
        CompositeScorer::new("completion_percentage")
            .rule(ScoreRule::count(
                "actions_executed",
                TierTable::at_least(&[(5.0, 0.3), (3.0, 0.2), (1.0, 0.1)]),
            ))
            .rule(ScoreRule::length(
                "results_achieved",
                TierTable::above(&[(200.0, 0.25), (100.0, 0.15), (0.0, 0.05)]),
            ))
            .rule(ScoreRule::length(
                "world_update",
                TierTable::above(&[(100.0, 0.2), (0.0, 0.1)]),
            ))
            .rule(ScoreRule::count(
                "responsibilities",
                TierTable::at_least(&[(3.0, 0.15), (1.0, 0.1)]),
            ))
            .rule(ScoreRule::count(
                "next_actions",
                TierTable::at_least(&[(1.0, 0.1)]),
            ))
    }
}

/// `Name: duty` items with a plausible name and a non-trivial duty.
fn responsibilities(items: &[String]) -> Map<String, Value> {
    items
        .iter()
        .filter_map(|item| split_labeled(item))
        .filter(|(name, duty)| {
            let name_len = name.chars().count();
            name_len > 3 && name_len < 30 && duty.chars().count() > 10
        })
        .map(|(name, duty)| (name.to_string(), Value::String(truncate(duty, 150))))
        .collect()
}

/// Executed actions as `{action, status, date}` records dated `date`.
fn executed_actions(items: &[String], date: &str) -> Vec<Value> {
    items
        .iter()
        .map(|action| {
            json!({
                "action": truncate(action, 150),
                "status": "COMPLETED",
                "date": date,
            })
        })
        .collect()
}

impl StageDefinition for Manifestation {
    fn id(&self) -> StageId {
        MANIFESTATION
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("first_concrete_steps", FieldKind::List))
            .field(FieldSpec::optional("manifestation_readiness", FieldKind::Score))
            .field(FieldSpec::optional("ready_to_manifest", FieldKind::Flag))
            .field(FieldSpec::optional("resource_requirements", FieldKind::Object))
            .field(FieldSpec::optional("stakeholder_alignment", FieldKind::Object))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("reflection")
            .list(
                "actions_executed",
                &["ACTIONS EXECUTED:", "ACCIONES EJECUTADAS:"],
            )
            .text(
                "results_achieved",
                &["RESULTS ACHIEVED:", "RESULTADOS LOGRADOS:", "RESULTADOS OBTENIDOS:"],
            )
            .text(
                "world_update",
                &[
                    "WORLD UPDATE:",
                    "WORLD STATE UPDATE:",
                    "ACTUALIZACIÓN DEL MUNDO:",
                    "ACTUALIZACION DEL MUNDO:",
                ],
            )
            .list(
                "responsibilities",
                &["RESPONSIBILITIES:", "RESPONSABILIDADES:"],
            )
            .list(
                "next_actions",
                &["NEXT ACTIONS:", "PRÓXIMAS ACCIONES:", "PROXIMAS ACCIONES:"],
            )
            .text("reflection", &["REFLECTION:", "REFLEXIÓN:", "REFLEXION:"])
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.5, 4096)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("plan manifested in the world")
            .require(GatePredicate::new(
                "actions_executed",
                GateMetric::Count("actions_executed".into()),
                Bound::AtLeast(1.0),
                "no actions executed",
            ))
            .require(GatePredicate::new(
                "results_achieved",
                GateMetric::Count("results_achieved".into()),
                Bound::AtLeast(1.0),
                "no results achieved",
            ))
            .require(GatePredicate::new(
                "world_updates",
                GateMetric::Count("world_updates".into()),
                Bound::AtLeast(1.0),
                "world state never updated",
            ))
            .require(GatePredicate::new(
                "responsibilities_assigned",
                GateMetric::Count("responsibilities_assigned".into()),
                Bound::AtLeast(1.0),
                "no responsibilities assigned",
            ))
            .observe("average_completion", GateMetric::Average("completion".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        let steps: Vec<String> = input
            .get("first_concrete_steps")
            .and_then(Value::as_array)
            .map(|steps| {
                steps
                    .iter()
                    .map(|step| match (step.get("action"), step.get("week")) {
                        (Some(Value::String(action)), Some(week)) => {
                            format!("week {}: {}", week, action)
                        }
                        (Some(Value::String(action)), None) => action.clone(),
                        _ => step.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let stakeholders: Vec<String> = input
            .object("stakeholder_alignment")
            .map(|map| {
                map.iter()
                    .map(|(name, entry)| {
                        let status = entry.get("status").and_then(Value::as_str).unwrap_or("");
                        format!("{}: {}", name, status)
                    })
                    .collect()
            })
            .unwrap_or_default();

        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .items("FIRST CONCRETE STEPS", &steps, 10)
            .percent("READINESS", input.score("manifestation_readiness"))
            .field(
                "READY TO MANIFEST",
                if input.flag("ready_to_manifest") { "yes" } else { "no" },
            )
            .items("STAKEHOLDERS", &stakeholders, 10)
            .respond_with(
                markers,
                &[
                    ("actions_executed", "what was actually done"),
                    ("results_achieved", "measurable results"),
                    ("world_update", "how the state of the world changed"),
                    ("responsibilities", "Name: what they are accountable for"),
                    ("next_actions", "what the next cycle starts with"),
                    ("reflection", "what was learned"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let completion = self.completion().score(record);
        let complete = completion >= COMPLETE_THRESHOLD;
        let assigned = responsibilities(record.list("responsibilities"));
        let world = record.text("world_update");
        let new_context = if world.is_empty() {
            record.text("results_achieved")
        } else {
            world
        };
        if complete {
            info!(stage = MANIFESTATION.name, completion, "manifestation complete");
        }
        let now = Utc::now();
        let executed = executed_actions(
            record.list("actions_executed"),
            &now.date_naive().to_string(),
        );

        Evaluation::new(ScoreSet::new().with("completion_percentage", completion))
            .counters(
                CounterUpdate::new()
                    .count("actions_executed", record.count("actions_executed") as u64)
                    .count_if(
                        "results_achieved",
                        !record.text("results_achieved").is_empty(),
                    )
                    .count_if("world_updates", !world.is_empty())
                    .count("responsibilities_assigned", assigned.len() as u64)
                    .total("completion", completion),
            )
            .field("actions_executed", executed)
            .field("manifestation_complete", complete)
            .field(
                "next_cycle_input",
                json!({
                    "ready_for_next_cycle": complete,
                    "new_context": truncate(new_context, 1000),
                    "next_actions": record.list("next_actions"),
                    "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
                }),
            )
            .field("responsibilities_assigned", assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::parser::parse;

    #[test]
    fn responsibility_names_are_bounded() {
        let items: Vec<String> = [
            "Ana: coordinates the weekly schedule",
            "Bo: too short a name for this",
            "Ministry of Education and Culture of the Region: funds the pilot",
            "Parents: short",
            "Local council: maintains the server room",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let map = responsibilities(&items);
        assert_eq!(map.len(), 1);
        assert_eq!(map["Local council"], "maintains the server room");
    }

    #[test]
    fn completion_and_next_cycle() {
        let raw = "\
ACTIONS EXECUTED:
- signed consent forms
- trained two teachers
- installed the server
RESULTS ACHIEVED:
Thirty students attended the first class.
WORLD UPDATE:
Three villages now have a working digital classroom.
RESPONSIBILITIES:
- Local council: maintains the server room
NEXT ACTIONS:
- extend to two more villages";
        let def = Manifestation;
        let record = parse(raw, &def.markers());
        let eval = def.evaluate(&record, &Payload::new());

        // 0.2 + 0.05 + 0.1 + 0.1 + 0.1
        let completion = eval.scores.get_or_zero("completion_percentage");
        assert!((completion - 0.55).abs() < 1e-9);
        assert!(!eval.fields.flag("manifestation_complete"));

        let next = eval.fields.object("next_cycle_input").unwrap();
        assert_eq!(next["ready_for_next_cycle"], false);
        assert_eq!(
            next["new_context"],
            "Three villages now have a working digital classroom."
        );
        assert!(next["timestamp"].as_str().unwrap().ends_with('Z'));

        let actions = eval.fields.get("actions_executed").and_then(Value::as_array).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0]["action"], "signed consent forms");
        assert_eq!(actions[0]["status"], "COMPLETED");
        assert_eq!(actions[0]["date"].as_str().unwrap().len(), "2026-01-01".len());
    }

    #[test]
    fn executed_actions_are_truncated() {
        let long = vec!["x".repeat(400)];
        let actions = executed_actions(&long, "2026-10-18");
        assert_eq!(actions[0]["action"].as_str().unwrap().len(), 150);
        assert_eq!(actions[0]["date"], "2026-10-18");
    }

    #[test]
    fn steps_are_required() {
        let contract = Manifestation.contract();
        assert!(contract.validate(MANIFESTATION, &Payload::new()).is_err());
        assert!(contract
            .validate(
                MANIFESTATION,
                &Payload::new().with("first_concrete_steps", json!([]))
            )
            .is_ok());
    }

    #[test]
    fn prompt_shows_weeks() {
        let def = Manifestation;
        let input = Payload::new().with(
            "first_concrete_steps",
            json!([{"action": "sign forms", "week": 1}]),
        );
        let prompt = def.build_prompt(&input, &def.markers());
        assert!(prompt.contains("1. week 1: sign forms"));
        assert!(prompt.contains("READY TO MANIFEST:\nno"));
    }
}
