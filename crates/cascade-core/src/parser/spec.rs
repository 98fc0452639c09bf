use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

fn default_delimiter() -> char {
    ':'
}

/// Per-stage description of the sections a response is expected to carry.
///
/// Marker synonyms are literal phrases matched case-insensitively anywhere in
/// a trimmed line. Declaration order is the match priority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkerSpec {
    pub sections: Vec<SectionSpec>,
    /// Section that receives the whole response when nothing else was filled.
    pub fallback: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionSpec {
    pub key: String,
    pub markers: Vec<String>,
    #[serde(default)]
    pub shape: ValueShape,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueShape {
    #[default]
    Text,
    BulletList,
    NestedList { sub_keys: Vec<SubKeySpec> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubKeySpec {
    pub key: String,
    pub markers: Vec<String>,
}

impl SubKeySpec {
    pub fn new(key: impl Into<String>, markers: &[&str]) -> Self {
        Self {
            key: key.into(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl MarkerSpec {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            sections: Vec::new(),
            fallback: fallback.into(),
            delimiter: default_delimiter(),
        }
    }

    pub fn text(self, key: &str, markers: &[&str]) -> Self {
        self.section(key, markers, ValueShape::Text)
    }

    pub fn list(self, key: &str, markers: &[&str]) -> Self {
        self.section(key, markers, ValueShape::BulletList)
    }

    pub fn nested(self, key: &str, markers: &[&str], sub_keys: Vec<SubKeySpec>) -> Self {
        self.section(key, markers, ValueShape::NestedList { sub_keys })
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn section(mut self, key: &str, markers: &[&str], shape: ValueShape) -> Self {
        self.sections.push(SectionSpec {
            key: key.to_string(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
            shape,
        });
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.key.as_str())
    }

    pub fn section_spec(&self, key: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Checks the invariants the parser relies on. Used when a spec comes
    /// from a config file rather than from code.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sections.is_empty() {
            return Err(ConfigError("marker spec declares no sections".into()));
        }
        let mut seen = BTreeSet::new();
        for section in &self.sections {
            if !seen.insert(section.key.as_str()) {
                return Err(ConfigError(format!(
                    "duplicate section key '{}'",
                    section.key
                )));
            }
            if section.markers.iter().all(|m| m.trim().is_empty()) {
                return Err(ConfigError(format!(
                    "section '{}' has no usable marker",
                    section.key
                )));
            }
            if let ValueShape::NestedList { sub_keys } = &section.shape {
                if sub_keys.is_empty() {
                    return Err(ConfigError(format!(
                        "nested section '{}' declares no sub-keys",
                        section.key
                    )));
                }
            }
        }
        if !seen.contains(self.fallback.as_str()) {
            return Err(ConfigError(format!(
                "fallback section '{}' is not declared",
                self.fallback
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_declaration_order() {
        let spec = MarkerSpec::new("notes")
            .list("items", &["ITEMS:"])
            .text("notes", &["NOTES:"]);
        assert_eq!(spec.keys().collect::<Vec<_>>(), vec!["items", "notes"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_fallback() {
        let spec = MarkerSpec::new("missing").text("notes", &["NOTES:"]);
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn validate_rejects_duplicate_keys() {
        let spec = MarkerSpec::new("a").text("a", &["A:"]).list("a", &["B:"]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
fallback: notes
sections:
  - key: notes
    markers: ["NOTES:", "NOTAS:"]
  - key: groups
    markers: ["GROUPS:"]
    shape:
      kind: nested_list
      sub_keys:
        - key: primary
          markers: ["PRIMARY:"]
"#;
        let spec: MarkerSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.delimiter, ':');
        assert_eq!(spec.sections[0].shape, ValueShape::Text);
        assert!(matches!(
            spec.sections[1].shape,
            ValueShape::NestedList { ref sub_keys } if sub_keys.len() == 1
        ));
        spec.validate().unwrap();
    }
}
