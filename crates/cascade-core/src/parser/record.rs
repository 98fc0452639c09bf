use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Content of one parsed section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionValue {
    Text(String),
    List(Vec<String>),
    /// Sub-key to items, in the order the sub-keys were declared.
    Nested(Vec<(String, Vec<String>)>),
}

impl SectionValue {
    pub fn is_empty(&self) -> bool {
        match self {
            SectionValue::Text(text) => text.trim().is_empty(),
            SectionValue::List(items) => items.is_empty(),
            SectionValue::Nested(groups) => groups.iter().all(|(_, items)| items.is_empty()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            SectionValue::Text(text) => Value::String(text.clone()),
            SectionValue::List(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            SectionValue::Nested(groups) => {
                let mut map = Map::new();
                for (key, items) in groups {
                    map.insert(
                        key.clone(),
                        Value::Array(items.iter().cloned().map(Value::String).collect()),
                    );
                }
                Value::Object(map)
            }
        }
    }
}

/// Why a record carries less structure than its spec asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsingDegradation {
    /// No section was filled; the whole response landed in the fallback section.
    FallbackOnly { section: String },
    /// Some declared sections stayed empty.
    EmptySections { keys: Vec<String> },
}

impl fmt::Display for ParsingDegradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsingDegradation::FallbackOnly { section } => {
                write!(f, "no markers matched, response kept in '{}'", section)
            }
            ParsingDegradation::EmptySections { keys } => {
                write!(f, "empty sections: {}", keys.join(", "))
            }
        }
    }
}

/// Ordered section-key to content mapping produced by [`super::parse`].
///
/// Every key declared in the marker spec is present.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    entries: Vec<(String, SectionValue)>,
    fallback_used: bool,
}

impl ParsedRecord {
    pub(crate) fn new(entries: Vec<(String, SectionValue)>, fallback_used: bool) -> Self {
        Self {
            entries,
            fallback_used,
        }
    }

    pub fn get(&self, key: &str) -> Option<&SectionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Text content of `key`, or `""` if the section is absent or not text.
    pub fn text(&self, key: &str) -> &str {
        match self.get(key) {
            Some(SectionValue::Text(text)) => text,
            _ => "",
        }
    }

    /// Items of a list section, or an empty slice.
    pub fn list(&self, key: &str) -> &[String] {
        match self.get(key) {
            Some(SectionValue::List(items)) => items,
            _ => &[],
        }
    }

    /// Items filed under `sub_key` inside a nested section.
    pub fn nested(&self, key: &str, sub_key: &str) -> &[String] {
        match self.get(key) {
            Some(SectionValue::Nested(groups)) => groups
                .iter()
                .find(|(k, _)| k == sub_key)
                .map(|(_, items)| items.as_slice())
                .unwrap_or(&[]),
            _ => &[],
        }
    }

    /// Number of items in a list or nested section; zero for text.
    pub fn count(&self, key: &str) -> usize {
        match self.get(key) {
            Some(SectionValue::List(items)) => items.len(),
            Some(SectionValue::Nested(groups)) => groups.iter().map(|(_, i)| i.len()).sum(),
            _ => 0,
        }
    }

    /// Character length of a text section; zero otherwise.
    pub fn text_len(&self, key: &str) -> usize {
        self.text(key).chars().count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SectionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, v)| v.is_empty())
    }

    pub fn fallback_used(&self) -> bool {
        self.fallback_used
    }

    pub fn degradation(&self) -> Option<ParsingDegradation> {
        if self.fallback_used {
            let section = self
                .entries
                .iter()
                .find(|(_, v)| !v.is_empty())
                .map(|(k, _)| k.clone())
                .unwrap_or_default();
            return Some(ParsingDegradation::FallbackOnly { section });
        }
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, v)| v.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        if keys.is_empty() {
            None
        } else {
            Some(ParsingDegradation::EmptySections { keys })
        }
    }

    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParsedRecord {
        ParsedRecord::new(
            vec![
                ("summary".into(), SectionValue::Text("all good".into())),
                (
                    "items".into(),
                    SectionValue::List(vec!["one".into(), "two".into()]),
                ),
                (
                    "groups".into(),
                    SectionValue::Nested(vec![
                        ("primary".into(), vec!["a".into()]),
                        ("secondary".into(), vec![]),
                    ]),
                ),
                ("empty".into(), SectionValue::Text(String::new())),
            ],
            false,
        )
    }

    #[test]
    fn typed_accessors_default_on_shape_mismatch() {
        let record = sample();
        assert_eq!(record.text("summary"), "all good");
        assert_eq!(record.text("items"), "");
        assert!(record.list("summary").is_empty());
        assert_eq!(record.count("items"), 2);
        assert_eq!(record.count("groups"), 1);
        assert_eq!(record.nested("groups", "primary"), ["a".to_string()]);
        assert!(record.nested("groups", "tertiary").is_empty());
        assert_eq!(record.text_len("summary"), 8);
    }

    #[test]
    fn degradation_lists_empty_sections() {
        let record = sample();
        assert_eq!(
            record.degradation(),
            Some(ParsingDegradation::EmptySections {
                keys: vec!["empty".into()]
            })
        );
    }

    #[test]
    fn nested_serializes_as_object() {
        let json = sample().to_json();
        assert_eq!(json["groups"]["primary"][0], "a");
        assert_eq!(json["items"][1], "two");
    }
}
