use super::StageId;
use crate::errors::InputContractError;
use crate::payload::Payload;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    List,
    Score,
    Flag,
    Object,
    Any,
}

impl FieldKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::List => value.is_array(),
            FieldKind::Score => value.is_number(),
            FieldKind::Flag => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::List => "a list",
            FieldKind::Score => "a number",
            FieldKind::Flag => "a boolean",
            FieldKind::Object => "an object",
            FieldKind::Any => "any value",
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub non_empty: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            non_empty: false,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            non_empty: false,
        }
    }

    pub const fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }
}

/// Fields a stage reads from its input payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputContract {
    fields: Vec<FieldSpec>,
    any_of: Vec<Vec<&'static str>>,
}

impl InputContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// At least one of `names` must be present and non-empty.
    pub fn any_of(mut self, names: &[&'static str]) -> Self {
        self.any_of.push(names.to_vec());
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn validate(&self, stage: StageId, input: &Payload) -> Result<(), InputContractError> {
        for spec in &self.fields {
            let Some(value) = input.get(spec.name) else {
                if spec.required {
                    return Err(InputContractError::MissingField {
                        stage,
                        field: spec.name.to_string(),
                    });
                }
                continue;
            };
            if !spec.kind.accepts(value) {
                return Err(InputContractError::WrongShape {
                    stage,
                    field: spec.name.to_string(),
                    expected: spec.kind,
                    found: json_kind(value),
                });
            }
            if spec.non_empty && is_blank(value) {
                return Err(InputContractError::EmptyField {
                    stage,
                    field: spec.name.to_string(),
                });
            }
        }
        for group in &self.any_of {
            let satisfied = group
                .iter()
                .any(|name| input.get(name).is_some_and(|v| !is_blank(v)));
            if !satisfied {
                return Err(InputContractError::MissingAnyOf {
                    stage,
                    fields: group.iter().map(|n| n.to_string()).collect(),
                });
            }
        }
        Ok(())
    }
}
