//! Small helpers for deriving structured values out of section text.

/// First `max` chars of `text`.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Splits `"Label: rest"` into a trimmed label and rest.
///
/// Leading bullets and markdown emphasis around the label are ignored.
pub(crate) fn split_labeled(line: &str) -> Option<(&str, &str)> {
    let (label, rest) = line.split_once(':')?;
    let label = label
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•') || c.is_whitespace())
        .trim_matches(|c: char| c == '*' || c.is_whitespace());
    let rest = rest.trim_start_matches('*').trim();
    if label.is_empty() {
        return None;
    }
    Some((label, rest))
}

/// Capitalizes the first char.
pub(crate) fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
