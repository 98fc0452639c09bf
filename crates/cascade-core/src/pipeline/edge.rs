use crate::payload::Payload;
use crate::stage::StageOutput;
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a target field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// A field of the payload the run started with.
    Initial(&'static str),
    /// One field of an earlier stage's output.
    Field { stage: u8, field: &'static str },
    /// An earlier stage's whole output, as an object.
    Output(u8),
}

impl FieldSource {
    pub fn stage(&self) -> Option<u8> {
        match self {
            FieldSource::Initial(_) => None,
            FieldSource::Field { stage, .. } | FieldSource::Output(stage) => Some(*stage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub target: &'static str,
    pub source: FieldSource,
}

/// Field mappings that assemble one stage's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub to: u8,
    pub mappings: Vec<FieldMapping>,
}

impl Edge {
    pub fn into_stage(to: u8) -> Self {
        Self {
            to,
            mappings: Vec::new(),
        }
    }

    pub fn map(mut self, target: &'static str, source: FieldSource) -> Self {
        self.mappings.push(FieldMapping { target, source });
        self
    }

    pub fn initial(self, target: &'static str, field: &'static str) -> Self {
        self.map(target, FieldSource::Initial(field))
    }

    pub fn field(self, target: &'static str, stage: u8, field: &'static str) -> Self {
        self.map(target, FieldSource::Field { stage, field })
    }

    /// Copies `fields` from `stage` under their own names.
    pub fn fields(self, stage: u8, fields: &[&'static str]) -> Self {
        fields
            .iter()
            .fold(self, |edge, &field| edge.field(field, stage, field))
    }

    pub fn output(self, target: &'static str, stage: u8) -> Self {
        self.map(target, FieldSource::Output(stage))
    }

    pub fn source_stages(&self) -> impl Iterator<Item = u8> + '_ {
        self.mappings.iter().filter_map(|m| m.source.stage())
    }

    /// Unresolvable sources are left out; the target's contract reports them.
    pub(crate) fn assemble(&self, initial: &Payload, outputs: &BTreeMap<u8, StageOutput>) -> Payload {
        let mut input = Payload::new();
        for mapping in &self.mappings {
            let value = match &mapping.source {
                FieldSource::Initial(field) => initial.get(field).cloned(),
                FieldSource::Field { stage, field } => outputs
                    .get(stage)
                    .and_then(|out| out.fields.get(field))
                    .cloned(),
                FieldSource::Output(stage) => outputs
                    .get(stage)
                    .map(|out| Value::Object(out.fields.as_map().clone())),
            };
            if let Some(value) = value {
                input.insert(mapping.target, value);
            }
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreSet;
    use crate::stage::StageId;
    use serde_json::json;
    use std::time::Duration;

    fn outputs() -> BTreeMap<u8, StageOutput> {
        let mut map = BTreeMap::new();
        map.insert(
            4,
            StageOutput {
                stage: StageId::new(4, "compassion"),
                fields: Payload::new()
                    .with("compassion_score", 0.7)
                    .with("giving_opportunities", json!(["a"])),
                scores: ScoreSet::new(),
                degradation: None,
                duration: Duration::ZERO,
            },
        );
        map
    }

    #[test]
    fn assembles_from_all_source_kinds() {
        let edge = Edge::into_stage(6)
            .initial("action", "action")
            .fields(4, &["compassion_score"])
            .output("compassion_output", 4);
        let input = edge.assemble(&Payload::new().with("action", "act"), &outputs());

        assert_eq!(input.text("action"), "act");
        assert_eq!(input.score("compassion_score"), 0.7);
        assert_eq!(
            input.object("compassion_output").unwrap()["giving_opportunities"],
            json!(["a"])
        );
        assert_eq!(edge.source_stages().collect::<Vec<_>>(), vec![4, 4]);
    }

    #[test]
    fn missing_sources_are_absent() {
        let edge = Edge::into_stage(6)
            .initial("context", "context")
            .field("boundaries_output", 5, "severity_score")
            .output("boundaries", 5);
        let input = edge.assemble(&Payload::new(), &outputs());
        assert!(input.is_empty());
    }
}
