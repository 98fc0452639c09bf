//! Marker-based section parser.
//!
//! Generated text is untrusted with respect to formatting: headers may be
//! missing, reordered, decorated with markdown or written in another
//! language. Parsing therefore never fails; a response without recognizable
//! structure ends up whole in the spec's fallback section.

mod record;
mod spec;

pub use record::{ParsedRecord, ParsingDegradation, SectionValue};
pub use spec::{MarkerSpec, SectionSpec, SubKeySpec, ValueShape};

const BULLETS: &[char] = &['-', '*', '•', '+'];

/// Upper-cases char by char, keeping chars whose upper-case form is not a
/// single char. The result has the same char count as the input, so char
/// offsets found in it are valid in the original line.
fn fold(line: &str) -> String {
    line.chars()
        .map(|c| {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) => u,
                _ => c,
            }
        })
        .collect()
}

struct Matcher {
    sections: Vec<Vec<String>>,
    sub_keys: Vec<Vec<Vec<String>>>,
}

impl Matcher {
    fn new(spec: &MarkerSpec) -> Self {
        let folded = |markers: &[String]| -> Vec<String> {
            markers
                .iter()
                .map(|m| fold(m.trim()))
                .filter(|m| !m.is_empty())
                .collect()
        };
        let sections = spec.sections.iter().map(|s| folded(&s.markers)).collect();
        let sub_keys = spec
            .sections
            .iter()
            .map(|s| match &s.shape {
                ValueShape::NestedList { sub_keys } => {
                    sub_keys.iter().map(|k| folded(&k.markers)).collect()
                }
                _ => Vec::new(),
            })
            .collect();
        Self { sections, sub_keys }
    }

    /// First (index, char offset of the marker) in declaration order.
    fn find(candidates: &[Vec<String>], folded_line: &str) -> Option<(usize, usize)> {
        candidates.iter().enumerate().find_map(|(idx, markers)| {
            markers.iter().find_map(|marker| {
                folded_line
                    .find(marker.as_str())
                    .map(|byte| (idx, folded_line[..byte].chars().count()))
            })
        })
    }

    fn section(&self, folded_line: &str) -> Option<(usize, usize)> {
        Self::find(&self.sections, folded_line)
    }

    fn sub_key(&self, section: usize, folded_line: &str) -> Option<(usize, usize)> {
        Self::find(&self.sub_keys[section], folded_line)
    }
}

/// Content following the delimiter that comes at or after the marker.
fn inline_remainder(line: &str, marker_start: usize, delimiter: char) -> Option<String> {
    let tail: String = line.chars().skip(marker_start).collect();
    let (_, rest) = tail.split_once(delimiter)?;
    let rest = rest
        .trim_start_matches(|c: char| c == '*' || c == '#' || c.is_whitespace())
        .trim_end();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn strip_ordinal(s: &str) -> &str {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return s;
    }
    let after = &s[digits..];
    let mut chars = after.chars();
    match (chars.next(), chars.next()) {
        (Some('.' | ')'), None) => "",
        (Some('.' | ')'), Some(c)) if c.is_whitespace() => after[1..].trim_start(),
        _ => s,
    }
}

fn clean_item(line: &str) -> Option<String> {
    let mut rest = line.trim();
    loop {
        let next = strip_ordinal(rest.trim_start_matches(BULLETS).trim_start());
        if next.len() == rest.len() {
            break;
        }
        rest = next;
    }
    (!rest.is_empty()).then(|| rest.to_string())
}

fn empty_value(shape: &ValueShape) -> SectionValue {
    match shape {
        ValueShape::Text => SectionValue::Text(String::new()),
        ValueShape::BulletList => SectionValue::List(Vec::new()),
        ValueShape::NestedList { sub_keys } => SectionValue::Nested(
            sub_keys.iter().map(|k| (k.key.clone(), Vec::new())).collect(),
        ),
    }
}

fn fallback_value(shape: &ValueShape, text: &str) -> SectionValue {
    let mut value = empty_value(shape);
    match &mut value {
        SectionValue::Text(t) => t.push_str(text),
        SectionValue::List(items) => items.push(text.to_string()),
        SectionValue::Nested(groups) => {
            if let Some((_, items)) = groups.first_mut() {
                items.push(text.to_string());
            }
        }
    }
    value
}

type Buffer = Vec<(Option<usize>, String)>;

fn flush(value: &mut SectionValue, buffer: &mut Buffer) {
    let lines = std::mem::take(buffer);
    if lines.is_empty() {
        return;
    }
    match value {
        SectionValue::Text(text) => {
            let joined = lines
                .into_iter()
                .map(|(_, line)| line)
                .collect::<Vec<_>>()
                .join("\n");
            let joined = joined.trim();
            if joined.is_empty() {
                return;
            }
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(joined);
        }
        SectionValue::List(items) => {
            items.extend(lines.iter().filter_map(|(_, line)| clean_item(line)));
        }
        SectionValue::Nested(groups) => {
            for (sub, line) in lines {
                let Some(item) = clean_item(&line) else {
                    continue;
                };
                // Content before any sub-header is filed under the first sub-key.
                if let Some((_, items)) = groups.get_mut(sub.unwrap_or(0)) {
                    items.push(item);
                }
            }
        }
    }
}

/// Splits `raw` into the sections declared by `spec`.
pub fn parse(raw: &str, spec: &MarkerSpec) -> ParsedRecord {
    let matcher = Matcher::new(spec);
    let mut values: Vec<SectionValue> = spec.sections.iter().map(|s| empty_value(&s.shape)).collect();
    let mut current: Option<usize> = None;
    let mut active_sub: Option<usize> = None;
    let mut buffer: Buffer = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let folded = fold(trimmed);

        if let Some((idx, start)) = matcher.section(&folded) {
            if let Some(cur) = current {
                flush(&mut values[cur], &mut buffer);
            }
            current = Some(idx);
            active_sub = None;
            if let Some(rest) = inline_remainder(trimmed, start, spec.delimiter) {
                buffer.push((None, rest));
            }
            continue;
        }

        let Some(cur) = current else {
            continue;
        };
        if let Some((sub, start)) = matcher.sub_key(cur, &folded) {
            active_sub = Some(sub);
            if let Some(rest) = inline_remainder(trimmed, start, spec.delimiter) {
                buffer.push((Some(sub), rest));
            }
            continue;
        }
        buffer.push((active_sub, trimmed.to_string()));
    }
    if let Some(cur) = current {
        flush(&mut values[cur], &mut buffer);
    }

    let mut fallback_used = false;
    let text = raw.trim();
    if !text.is_empty() && values.iter().all(SectionValue::is_empty) {
        if let Some(idx) = spec.sections.iter().position(|s| s.key == spec.fallback) {
            values[idx] = fallback_value(&spec.sections[idx].shape, text);
            fallback_used = true;
        }
    }

    let entries = spec
        .sections
        .iter()
        .map(|s| s.key.clone())
        .zip(values)
        .collect();
    ParsedRecord::new(entries, fallback_used)
}

fn header(marker: &str, delimiter: char) -> String {
    let marker = marker.trim();
    if marker.ends_with(delimiter) {
        marker.to_string()
    } else {
        format!("{marker}{delimiter}")
    }
}

/// Writes a record back as marker-delimited text using each section's first
/// synonym. Parsing the result with the same spec yields the same record.
pub fn render(record: &ParsedRecord, spec: &MarkerSpec) -> String {
    let mut blocks = Vec::new();
    for section in &spec.sections {
        let Some(value) = record.get(&section.key) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let Some(marker) = section.markers.iter().find(|m| !m.trim().is_empty()) else {
            continue;
        };
        let mut block = header(marker, spec.delimiter);
        match value {
            SectionValue::Text(text) => {
                block.push('\n');
                block.push_str(text);
            }
            SectionValue::List(items) => {
                for item in items {
                    block.push_str("\n- ");
                    block.push_str(item);
                }
            }
            SectionValue::Nested(groups) => {
                let ValueShape::NestedList { sub_keys } = &section.shape else {
                    continue;
                };
                for (key, items) in groups.iter().filter(|(_, items)| !items.is_empty()) {
                    let sub_marker = sub_keys
                        .iter()
                        .find(|s| &s.key == key)
                        .and_then(|s| s.markers.first());
                    if let Some(sub_marker) = sub_marker {
                        block.push('\n');
                        block.push_str(&header(sub_marker, spec.delimiter));
                    }
                    for item in items {
                        block.push_str("\n- ");
                        block.push_str(item);
                    }
                }
            }
        }
        blocks.push(block);
    }
    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunities_spec() -> MarkerSpec {
        MarkerSpec::new("limits")
            .list("opportunities", &["OPPORTUNITIES"])
            .list("limits", &["LIMITS"])
    }

    #[test]
    fn parses_bullet_sections() {
        let record = parse(
            "OPPORTUNITIES:\n- help A\n- help B\nLIMITS:\n- limit 1",
            &opportunities_spec(),
        );
        assert_eq!(record.list("opportunities"), ["help A", "help B"]);
        assert_eq!(record.list("limits"), ["limit 1"]);
        assert!(!record.fallback_used());
        assert_eq!(record.degradation(), None);
    }

    #[test]
    fn captures_inline_content_after_delimiter() {
        let spec = MarkerSpec::new("analysis")
            .text("understanding", &["UNDERSTANDING:", "COMPRENSIÓN:"])
            .text("analysis", &["ANALYSIS:"]);
        let record = parse(
            "**Comprensión:** the problem is scoped\nmore detail\n\nAnalysis: short",
            &spec,
        );
        assert_eq!(
            record.text("understanding"),
            "the problem is scoped\nmore detail"
        );
        assert_eq!(record.text("analysis"), "short");
    }

    #[test]
    fn marker_without_colon_matches_anywhere_in_line() {
        let spec = MarkerSpec::new("synthesis")
            .text("history", &["CONTEXTO HISTORICO", "HISTORICAL CONTEXT"])
            .text("synthesis", &["CONTEXTUAL SYNTHESIS"]);
        let record = parse(
            "## 1. Historical context (past decade): roots\nolder events\n## 2. Contextual synthesis\nwrap up",
            &spec,
        );
        assert_eq!(record.text("history"), "roots\nolder events");
        assert_eq!(record.text("synthesis"), "wrap up");
    }

    #[test]
    fn first_declared_marker_wins() {
        let spec = MarkerSpec::new("b")
            .text("a", &["LIMITS"])
            .text("b", &["NECESSARY LIMITS"]);
        let record = parse("NECESSARY LIMITS:\nkeep it small", &spec);
        assert_eq!(record.text("a"), "keep it small");
        assert_eq!(record.text("b"), "");
    }

    #[test]
    fn no_markers_falls_back_to_whole_text() {
        let record = parse("  just prose\nwith two lines  ", &opportunities_spec());
        assert_eq!(record.list("limits"), ["just prose\nwith two lines"]);
        assert!(record.list("opportunities").is_empty());
        assert_eq!(
            record.degradation(),
            Some(ParsingDegradation::FallbackOnly {
                section: "limits".into()
            })
        );
    }

    #[test]
    fn markers_without_content_still_fall_back() {
        let record = parse("OPPORTUNITIES:\nLIMITS:", &opportunities_spec());
        assert_eq!(record.list("limits"), ["OPPORTUNITIES:\nLIMITS:"]);
    }

    #[test]
    fn empty_input_keeps_every_key() {
        let record = parse("", &opportunities_spec());
        assert_eq!(
            record.keys().collect::<Vec<_>>(),
            vec!["opportunities", "limits"]
        );
        assert!(record.is_empty());
        assert!(!record.fallback_used());
    }

    #[test]
    fn strips_numbered_and_decorated_bullets() {
        let record = parse(
            "OPPORTUNITIES:\n1. first\n2) second\n  * third\n• fourth\n3.5% growth\n-",
            &opportunities_spec(),
        );
        assert_eq!(
            record.list("opportunities"),
            ["first", "second", "third", "fourth", "3.5% growth"]
        );
    }

    #[test]
    fn repeated_section_appends() {
        let spec = MarkerSpec::new("notes")
            .text("notes", &["NOTES:"])
            .list("items", &["ITEMS:"]);
        let record = parse(
            "NOTES: one\nITEMS:\n- a\nNOTES: two\nITEMS:\n- b",
            &spec,
        );
        assert_eq!(record.text("notes"), "one\ntwo");
        assert_eq!(record.list("items"), ["a", "b"]);
    }

    #[test]
    fn nested_sections_switch_sub_keys() {
        let spec = MarkerSpec::new("impact")
            .nested(
                "beneficiaries",
                &["BENEFICIARIES:", "BENEFICIARIOS:"],
                vec![
                    SubKeySpec::new("primary", &["PRIMARY:", "PRIMARIOS:"]),
                    SubKeySpec::new("secondary", &["SECONDARY:", "SECUNDARIOS:"]),
                    SubKeySpec::new("tertiary", &["LONG TERM:", "LARGO PLAZO:"]),
                ],
            )
            .text("impact", &["IMPACT:"]);
        let raw = "Beneficiarios:\n- students first\n- Primarios: students\n- teachers\nSecundarios:\n- parents\nLargo plazo: the town\nIMPACT: wide";
        let record = parse(raw, &spec);
        assert_eq!(
            record.nested("beneficiaries", "primary"),
            ["students first", "students", "teachers"]
        );
        assert_eq!(record.nested("beneficiaries", "secondary"), ["parents"]);
        assert_eq!(record.nested("beneficiaries", "tertiary"), ["the town"]);
        assert_eq!(record.text("impact"), "wide");
    }

    #[test]
    fn lines_before_first_marker_are_ignored() {
        let record = parse(
            "Sure, here you go.\nLIMITS:\n- one",
            &opportunities_spec(),
        );
        assert_eq!(record.list("limits"), ["one"]);
        assert!(record.list("opportunities").is_empty());
    }

    #[test]
    fn render_then_parse_is_stable() {
        let spec = opportunities_spec();
        let record = parse(
            "OPPORTUNITIES:\n- help A\nLIMITS:\n- limit 1\n- limit 2",
            &spec,
        );
        let rendered = render(&record, &spec);
        assert_eq!(rendered, "OPPORTUNITIES:\n- help A\nLIMITS:\n- limit 1\n- limit 2");
        assert_eq!(parse(&rendered, &spec), record);
    }

    #[test]
    fn fold_keeps_char_offsets() {
        let folded = fold("straße ñandú");
        assert_eq!(folded.chars().count(), "straße ñandú".chars().count());
        assert!(folded.contains("ÑANDÚ"));
    }
}
