//! Stage 8: turns the persistence strategy into a precise, communicable plan.
//!
//! Besides the raw sections, the stage derives structured values from the
//! prose: numbered phases, stakeholders addressed by the communication
//! strategy, KPIs, documentation items and per-stakeholder key messages.

use crate::prompt::PromptBuilder;
use crate::text::{capitalize, split_labeled, truncate};
use cascade_core::gate::{AlignmentGate, GateMetric, GatePredicate};
use cascade_core::metrics::CounterUpdate;
use cascade_core::model::CompletionParams;
use cascade_core::parser::{MarkerSpec, ParsedRecord};
use cascade_core::scoring::{Bound, ScoreSet, TierTable};
use cascade_core::stage::{Evaluation, FieldKind, FieldSpec, InputContract, StageDefinition};
use cascade_core::{Payload, StageId};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

pub const STRUCTURE: StageId = StageId::new(8, "structure");

lazy_static! {
    static ref PHASE: Regex = Regex::new(r"(?i)\b(?:fase|phase)\s*(\d+)[:\-\s]+").unwrap();
    static ref KPI: Regex = Regex::new(r"(?i)\bKPI\s*\d*[:\-\s]+").unwrap();
    static ref DOC_ITEM: Regex = Regex::new(r"^[-*\d.]+\s*(.+)$").unwrap();
}

/// Stakeholder groups a communication strategy may address.
const AUDIENCES: &[(&str, &[&str])] = &[
    ("government", &["government", "gobierno"]),
    ("teachers", &["teachers", "maestros", "docentes"]),
    ("parents", &["parents", "padres"]),
    ("students", &["students", "estudiantes", "alumnos"]),
    ("community", &["community", "comunidad"]),
    ("team", &["team", "equipo"]),
    ("users", &["users", "usuarios"]),
    ("customers", &["customers", "clientes"]),
    ("partners", &["partners", "socios"]),
    ("investors", &["investors", "inversores"]),
];

const MAX_KPIS: usize = 10;
const MAX_DOC_ITEMS: usize = 15;
const MIN_ITEM_CHARS: usize = 10;
const MAX_LABEL_CHARS: usize = 40;

const ROLE: &str = "You are the structure stage of an evaluation pipeline. Turn the \
persistence strategy you receive into a precise plan: numbered phases, a communication \
strategy per stakeholder, measurable KPIs, the documentation to produce and the key \
message each audience needs to hear.";

#[derive(Debug, Clone, Default)]
pub struct Structure;

/// `phase_<n>` entries, or a single `general` entry when the plan is not phased.
fn phases(plan: &str) -> Map<String, Value> {
    let mut out = Map::new();
    let headers: Vec<_> = PHASE.captures_iter(plan).collect();
    for (i, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(plan.len(), |m| m.start());
        let Ok(n) = number.as_str().parse::<u32>() else {
            continue;
        };
        out.insert(
            format!("phase_{n}"),
            json!({
                "number": n,
                "content": truncate(plan[whole.end()..end].trim(), 500),
            }),
        );
    }
    if out.is_empty() && !plan.trim().is_empty() {
        out.insert(
            "general".into(),
            json!({ "content": truncate(plan.trim(), 1000) }),
        );
    }
    out
}

fn audiences(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    AUDIENCES
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(name, _)| capitalize(name))
        .collect()
}

/// KPI entries run to the next KPI header or the end of the line.
fn kpis(text: &str) -> Vec<String> {
    let headers: Vec<_> = KPI.find_iter(text).collect();
    headers
        .iter()
        .enumerate()
        .filter_map(|(i, m)| {
            let end = headers.get(i + 1).map_or(text.len(), |next| next.start());
            let body = &text[m.end()..end];
            let body = body.lines().next().unwrap_or_default().trim();
            (!body.is_empty()).then(|| truncate(body, 200))
        })
        .take(MAX_KPIS)
        .collect()
}

fn documentation_items(text: &str) -> Vec<String> {
    let long_enough = |s: &str| s.chars().count() > MIN_ITEM_CHARS;
    let items: Vec<String> = text
        .lines()
        .filter_map(|line| DOC_ITEM.captures(line.trim()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .filter(|item| long_enough(item))
        .map(|item| truncate(item, 200))
        .take(MAX_DOC_ITEMS)
        .collect();
    if !items.is_empty() {
        return items;
    }
    text.lines()
        .map(str::trim)
        .filter(|line| long_enough(line))
        .map(|line| truncate(line, 200))
        .take(MAX_DOC_ITEMS)
        .collect()
}

/// `Audience: message` lines, with unlabeled lines continuing the previous message.
fn stakeholder_messages(text: &str) -> Map<String, Value> {
    let mut entries: Vec<(String, String)> = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match split_labeled(line) {
            Some((label, rest)) if label.chars().count() <= MAX_LABEL_CHARS => {
                entries.push((label.to_lowercase(), rest.to_string()));
            }
            _ => {
                if let Some((_, message)) = entries.last_mut() {
                    if !message.is_empty() {
                        message.push(' ');
                    }
                    message.push_str(line);
                }
            }
        }
    }

    let mut out: Map<String, Value> = entries
        .into_iter()
        .filter(|(_, message)| message.chars().count() > MIN_ITEM_CHARS)
        .map(|(audience, message)| (audience, Value::String(truncate(&message, 300))))
        .collect();
    if out.is_empty() && !text.trim().is_empty() {
        out.insert("general".into(), Value::String(truncate(text.trim(), 500)));
    }
    out
}

fn precision(phases: usize, kpis: usize, docs: usize, messages: usize) -> f64 {
    TierTable::at_least(&[(3.0, 0.3), (2.0, 0.2), (1.0, 0.1)]).eval_count(phases)
        + TierTable::at_least(&[(5.0, 0.3), (3.0, 0.2), (1.0, 0.1)]).eval_count(kpis)
        + TierTable::at_least(&[(5.0, 0.2), (3.0, 0.15), (1.0, 0.1)]).eval_count(docs)
        + TierTable::at_least(&[(4.0, 0.2), (2.0, 0.15), (1.0, 0.1)]).eval_count(messages)
}

fn clarity(record: &ParsedRecord) -> f64 {
    let len = |key: &str| record.text_len(key) as f64;
    TierTable::above(&[(200.0, 0.25), (100.0, 0.15)]).eval(len("plan_text"))
        + TierTable::above(&[(150.0, 0.25), (75.0, 0.15)]).eval(len("communication_text"))
        + TierTable::above(&[(150.0, 0.25), (75.0, 0.15)]).eval(len("metrics_text"))
        + TierTable::above(&[(50.0, 0.25), (20.0, 0.15)]).eval(len("precision_evaluation"))
}

impl StageDefinition for Structure {
    fn id(&self) -> StageId {
        STRUCTURE
    }

    fn contract(&self) -> InputContract {
        InputContract::new()
            .field(FieldSpec::required("persistence_strategy", FieldKind::Text))
            .field(FieldSpec::optional("obstacles_identified", FieldKind::List))
            .field(FieldSpec::optional("victory_conditions", FieldKind::List))
            .field(FieldSpec::optional("endurance_plan", FieldKind::Text))
            .field(FieldSpec::optional("momentum_mechanisms", FieldKind::List))
            .field(FieldSpec::optional("sustainability_score", FieldKind::Score))
            .field(FieldSpec::optional("action", FieldKind::Text))
    }

    fn markers(&self) -> MarkerSpec {
        MarkerSpec::new("plan_text")
            .text("plan_text", &["STRUCTURED PLAN:", "PLAN ESTRUCTURADO:"])
            .text(
                "communication_text",
                &[
                    "COMMUNICATION STRATEGY:",
                    "ESTRATEGIA DE COMUNICACIÓN:",
                    "ESTRATEGIA DE COMUNICACION:",
                ],
            )
            .text(
                "metrics_text",
                &[
                    "METRICS FRAMEWORK:",
                    "SUCCESS METRICS:",
                    "MÉTRICAS DE ÉXITO:",
                    "METRICAS DE EXITO:",
                ],
            )
            .text(
                "documentation_text",
                &["DOCUMENTATION:", "DOCUMENTACIÓN:", "DOCUMENTACION:"],
            )
            .text("messages_text", &["KEY MESSAGES:", "MENSAJES CLAVE:"])
            .text(
                "precision_evaluation",
                &[
                    "PRECISION EVALUATION:",
                    "EVALUACIÓN DE PRECISIÓN:",
                    "EVALUACION DE PRECISION:",
                ],
            )
    }

    fn params(&self) -> CompletionParams {
        CompletionParams::new(0.6, 8192)
    }

    fn gate(&self) -> AlignmentGate {
        AlignmentGate::new("precise and communicable plan")
            .require(GatePredicate::new(
                "plans_structured",
                GateMetric::Count("plans_structured".into()),
                Bound::AtLeast(1.0),
                "no plan structured",
            ))
            .require(GatePredicate::new(
                "average_precision",
                GateMetric::Average("precision".into()),
                Bound::AtLeast(0.6),
                "low precision",
            ))
            .require(GatePredicate::new(
                "communications_designed",
                GateMetric::Count("communications_designed".into()),
                Bound::AtLeast(1.0),
                "no communication strategy designed",
            ))
            .require(GatePredicate::new(
                "metrics_defined",
                GateMetric::Count("metrics_defined".into()),
                Bound::AtLeast(1.0),
                "no metrics defined",
            ))
            .observe("average_clarity", GateMetric::Average("clarity".into()))
    }

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String {
        PromptBuilder::new(ROLE)
            .field("ACTION", input.text_or("action", "the proposed action"))
            .field("PERSISTENCE STRATEGY", input.text("persistence_strategy"))
            .items("OBSTACLES", &input.list("obstacles_identified"), 10)
            .items("VICTORY CONDITIONS", &input.list("victory_conditions"), 10)
            .field("ENDURANCE PLAN", input.text("endurance_plan"))
            .items("MOMENTUM MECHANISMS", &input.list("momentum_mechanisms"), 10)
            .percent("SUSTAINABILITY", input.score("sustainability_score"))
            .respond_with(
                markers,
                &[
                    ("plan_text", "Phase 1: ... Phase 2: ... with concrete deliverables"),
                    ("communication_text", "what each stakeholder is told, when and how"),
                    ("metrics_text", "KPI 1: ... KPI 2: ... each measurable"),
                    ("documentation_text", "- one document per line"),
                    ("messages_text", "Stakeholder: key message, one per line"),
                    ("precision_evaluation", "how specific and verifiable the plan is"),
                ],
            )
    }

    fn evaluate(&self, record: &ParsedRecord, _input: &Payload) -> Evaluation {
        let plan = phases(record.text("plan_text"));
        let communication = record.text("communication_text");
        let metrics = record.text("metrics_text");
        let kpis = kpis(metrics);
        let documentation = documentation_items(record.text("documentation_text"));
        let messages = stakeholder_messages(record.text("messages_text"));

        let precision = precision(plan.len(), kpis.len(), documentation.len(), messages.len());
        let clarity = clarity(record);

        Evaluation::new(
            ScoreSet::new()
                .with("precision_score", precision)
                .with("clarity_score", clarity),
        )
        .counters(
            CounterUpdate::new()
                .count_if("plans_structured", !plan.is_empty())
                .count_if("communications_designed", !communication.is_empty())
                .count_if("metrics_defined", !metrics.is_empty())
                .count("documentation_items", documentation.len() as u64)
                .total("precision", precision)
                .total("clarity", clarity),
        )
        .field("structured_plan", plan)
        .field(
            "communication_strategy",
            json!({
                "description": truncate(communication, 800),
                "stakeholders": audiences(communication),
            }),
        )
        .field(
            "metrics_framework",
            json!({
                "description": truncate(metrics, 800),
                "kpis": kpis,
            }),
        )
        .field("documentation", documentation)
        .field("stakeholder_messages", messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::parser::parse;

    #[test]
    fn phases_split_on_headers() {
        let plan = phases("Phase 1: sign agreements\nwith three schools\nFase 2 - train teachers");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan["phase_1"]["content"], "sign agreements\nwith three schools");
        assert_eq!(plan["phase_2"]["number"], 2);
    }

    #[test]
    fn unphased_plan_is_general() {
        let plan = phases("Just do it carefully.");
        assert_eq!(plan["general"]["content"], "Just do it carefully.");
        assert!(phases("   ").is_empty());
    }

    #[test]
    fn kpis_end_at_line_or_next_kpi() {
        let found = kpis("KPI 1: attendance above 90% KPI 2: reading level\nnot a metric");
        assert_eq!(found, ["attendance above 90%", "reading level"]);
        assert!(kpis("KPIs will be defined later").is_empty());
    }

    #[test]
    fn documentation_prefers_bullets() {
        let docs = documentation_items("Intro\n- signed consent forms\n- short\n2. quarterly impact report");
        assert_eq!(docs, ["signed consent forms", "quarterly impact report"]);
        let fallback = documentation_items("A plain paragraph about records.");
        assert_eq!(fallback, ["A plain paragraph about records."]);
    }

    #[test]
    fn messages_keyed_by_audience() {
        let messages = stakeholder_messages(
            "Parents: your children keep their data private\nand you decide.\nTeachers: ok",
        );
        assert_eq!(
            messages["parents"],
            "your children keep their data private and you decide."
        );
        // too short to count
        assert!(!messages.contains_key("teachers"));

        let bolded = stakeholder_messages("- **Local council**: keeps the classroom open all year");
        assert_eq!(bolded["local council"], "keeps the classroom open all year");

        let general = stakeholder_messages("We are all in this together.");
        assert_eq!(general["general"], "We are all in this together.");
    }

    #[test]
    fn evaluates_full_plan() {
        let raw = "\
STRUCTURED PLAN:
Phase 1: agreements with schools
Phase 2: teacher training
Phase 3: launch
COMMUNICATION STRATEGY:
Monthly letters to parents and a briefing for the government.
SUCCESS METRICS:
KPI 1: attendance
KPI 2: reading level
KPI 3: teacher retention
DOCUMENTATION:
- signed consent forms
KEY MESSAGES:
Parents: your children learn safely and you stay in control.";
        let def = Structure;
        let record = parse(raw, &def.markers());
        let eval = def.evaluate(&record, &Payload::new());

        // 0.3 (3 phases) + 0.2 (3 kpis) + 0.1 (1 doc) + 0.1 (1 message)
        assert!((eval.scores.get_or_zero("precision_score") - 0.7).abs() < 1e-9);
        let strategy = eval.fields.object("communication_strategy").unwrap();
        assert_eq!(strategy["stakeholders"], json!(["Government", "Parents"]));
        assert_eq!(eval.fields.list("documentation"), ["signed consent forms"]);
    }
}
