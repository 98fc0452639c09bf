use cascade_core::parser::{parse, MarkerSpec, ValueShape};
use cascade_core::stage::StageDefinition;
use cascade_core::Payload;
use cascade_stages::{
    Boundaries, Compassion, Context, Foundation, Manifestation, Persistence, Reasoning, Structure,
    Synthesis,
};
use proptest::prelude::*;
use serde_json::Value;

fn definitions() -> Vec<Box<dyn StageDefinition>> {
    vec![
        Box::new(Reasoning),
        Box::new(Context),
        Box::new(Compassion),
        Box::new(Boundaries::default()),
        Box::new(Synthesis),
        Box::new(Persistence),
        Box::new(Structure),
        Box::new(Foundation),
        Box::new(Manifestation),
    ]
}

/// Replies mixing real headers, bullets, labels and noise.
fn reply() -> impl Strategy<Value = String> {
    let line = prop_oneof![
        Just("STRUCTURED PLAN:".to_string()),
        Just("KEY MESSAGES:".to_string()),
        Just("FIRST CONCRETE STEPS:".to_string()),
        Just("SUCCESS METRICS:".to_string()),
        Just("DOCUMENTATION:".to_string()),
        Just("RESPONSIBILITIES:".to_string()),
        Just("GIVING OPPORTUNITIES:".to_string()),
        Just("BENEFICIARIES:".to_string()),
        Just("Phase 2: train".to_string()),
        Just("KPI 3: attendance".to_string()),
        Just("- Week 7: launch".to_string()),
        "[a-zA-Z ]{0,40}: [a-zA-Z ]{0,60}",
        "- [a-zA-Zéñ0-9 ]{0,60}",
        "\\PC{0,80}",
    ];
    prop::collection::vec(line, 0..25).prop_map(|lines| lines.join("\n"))
}

const FLOOD_ITEMS: &[&str] = &[
    "soil",
    "Week 3: plant seeds",
    "Phase 2: train volunteers",
    "KPI 1: yield per hectare",
    "Council: maintains the wells every season",
    "**bold** claim",
    "1. numbered",
];

/// A reply answering every declared section, each list with `bullets` items.
fn flooded_reply(markers: &MarkerSpec, bullets: usize, offset: usize) -> String {
    let item = |i: usize| FLOOD_ITEMS[(i + offset) % FLOOD_ITEMS.len()];
    let mut out = String::new();
    for section in &markers.sections {
        out.push_str(&section.markers[0]);
        out.push('\n');
        match &section.shape {
            ValueShape::Text => {
                for i in 0..bullets {
                    out.push_str(item(i));
                    out.push('\n');
                }
            }
            ValueShape::BulletList => {
                for i in 0..bullets {
                    out.push_str(&format!("- {} {}\n", item(i), i));
                }
            }
            ValueShape::NestedList { sub_keys } => {
                for sub in sub_keys {
                    out.push_str(&sub.markers[0]);
                    out.push('\n');
                    for i in 0..bullets {
                        out.push_str(&format!("- {} {}\n", item(i), i));
                    }
                }
            }
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    #[test]
    fn scores_stay_in_range_for_thousands_of_bullets(
        bullets in 4_000usize..6_000,
        offset in 0usize..7,
    ) {
        for def in definitions() {
            let markers = def.markers();
            let record = parse(&flooded_reply(&markers, bullets, offset), &markers);
            let eval = def.evaluate(&record, &Payload::new());
            for (name, value) in eval.scores.iter() {
                let max = if name == "perspectives_count" { 6.0 } else { 1.0 };
                prop_assert!(
                    (0.0..=max).contains(&value),
                    "{} {} = {}", def.id().name, name, value
                );
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scores_stay_in_range_for_any_reply(raw in reply()) {
        for def in definitions() {
            let record = parse(&raw, &def.markers());
            let eval = def.evaluate(&record, &Payload::new());
            for (name, value) in eval.scores.iter() {
                let max = if name == "perspectives_count" { 6.0 } else { 1.0 };
                prop_assert!(
                    (0.0..=max).contains(&value),
                    "{} {} = {}", def.id().name, name, value
                );
            }
        }
    }

    #[test]
    fn structure_caps_derived_lists(raw in reply()) {
        let def = Structure;
        let eval = def.evaluate(&parse(&raw, &def.markers()), &Payload::new());
        let kpis = eval
            .fields
            .object("metrics_framework")
            .and_then(|m| m.get("kpis"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        prop_assert!(kpis <= 10);
        prop_assert!(eval.fields.list("documentation").len() <= 15);
    }

    #[test]
    fn foundation_steps_have_positive_weeks(raw in reply()) {
        let def = Foundation;
        let eval = def.evaluate(&parse(&raw, &def.markers()), &Payload::new());
        let steps = eval.fields.get("first_concrete_steps").and_then(Value::as_array).cloned().unwrap_or_default();
        for step in steps {
            prop_assert!(step["week"].as_u64().is_some());
            prop_assert!(step["action"].is_string());
        }
        if eval.fields.flag("ready_to_manifest") {
            prop_assert!(eval.scores.get_or_zero("manifestation_readiness") >= 0.75);
        }
    }
}
