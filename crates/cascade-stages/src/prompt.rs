use cascade_core::parser::{MarkerSpec, ValueShape};

const NONE: &str = "(none)";

/// Accumulates a stage prompt: role preamble, labelled inputs, then the
/// response layout derived from the stage's active [`MarkerSpec`].
///
/// The layout always uses the first synonym of each section, so a marker
/// override in config changes both what the backend is asked for and what
/// the parser looks for.
pub(crate) struct PromptBuilder {
    out: String,
}

impl PromptBuilder {
    pub(crate) fn new(role: &str) -> Self {
        let mut out = role.trim().to_string();
        out.push_str("\n\n");
        Self { out }
    }

    pub(crate) fn field(mut self, label: &str, value: &str) -> Self {
        let value = value.trim();
        self.out.push_str(label);
        self.out.push_str(":\n");
        self.out.push_str(if value.is_empty() { NONE } else { value });
        self.out.push_str("\n\n");
        self
    }

    /// Numbered list, at most `limit` items.
    pub(crate) fn items(mut self, label: &str, items: &[String], limit: usize) -> Self {
        self.out.push_str(label);
        self.out.push_str(":\n");
        if items.is_empty() {
            self.out.push_str(NONE);
            self.out.push('\n');
        }
        for (i, item) in items.iter().take(limit).enumerate() {
            self.out.push_str(&format!("{}. {}\n", i + 1, item));
        }
        self.out.push('\n');
        self
    }

    pub(crate) fn percent(mut self, label: &str, value: f64) -> Self {
        self.out
            .push_str(&format!("{}: {:.1}%\n\n", label, value * 100.0));
        self
    }

    pub(crate) fn note(mut self, text: &str) -> Self {
        self.out.push_str(text.trim());
        self.out.push_str("\n\n");
        self
    }

    /// Appends the expected response layout and returns the prompt.
    ///
    /// `hints` maps section (or nested sub-key) names to a short description.
    pub(crate) fn respond_with(mut self, markers: &MarkerSpec, hints: &[(&str, &str)]) -> String {
        let hint = |key: &str| {
            hints
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, h)| *h)
                .unwrap_or("...")
        };
        self.out
            .push_str("Structure your response exactly as follows:\n\n");
        for section in &markers.sections {
            let Some(marker) = section.markers.iter().find(|m| !m.trim().is_empty()) else {
                continue;
            };
            self.out.push_str(&header(marker, markers.delimiter));
            self.out.push('\n');
            match &section.shape {
                ValueShape::Text => {
                    self.out.push_str(&format!("[{}]\n", hint(&section.key)));
                }
                ValueShape::BulletList => {
                    self.out.push_str(&format!("- [{}]\n", hint(&section.key)));
                }
                ValueShape::NestedList { sub_keys } => {
                    for sub in sub_keys {
                        let Some(sub_marker) = sub.markers.first() else {
                            continue;
                        };
                        self.out.push_str(&format!(
                            "{} [{}]\n",
                            header(sub_marker, markers.delimiter),
                            hint(&sub.key)
                        ));
                    }
                }
            }
            self.out.push('\n');
        }
        self.out.trim_end().to_string()
    }
}

fn header(marker: &str, delimiter: char) -> String {
    let marker = marker.trim();
    if marker.ends_with(delimiter) {
        marker.to_string()
    } else {
        format!("{marker}{delimiter}")
    }
}
