use crate::scoring::CRITERION_LIMIT;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SCORE_TAG: Regex = Regex::new(r"(?i)SCORE:\s*([+-]?\d+)").unwrap();
    static ref SCORE_LOOSE: Regex = Regex::new(r"(?i)score\s*:\s*([+-]?\d+)").unwrap();
    static ref OUT_OF_TEN: Regex = Regex::new(r"(?m)^[\s\*]*([+-]?\d+)\s*/?\s*10").unwrap();
    static ref LEADING_INT: Regex = Regex::new(r"^[\s\*]*([+-]?\d+)").unwrap();
}

const LIMIT: i64 = CRITERION_LIMIT as i64;

/// Digits too long for i64 saturate by sign so they still clamp correctly.
fn parse_signed(digits: &str) -> i64 {
    digits.parse::<i64>().unwrap_or_else(|_| {
        if digits.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

fn capture(re: &Regex, text: &str) -> Option<i64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| parse_signed(m.as_str()))
}

fn in_range(value: i64) -> Option<i32> {
    (-LIMIT..=LIMIT)
        .contains(&value)
        .then_some(value as i32)
}

/// Pulls a `-10..=10` judgment out of a free-form reply.
///
/// Tagged forms are clamped; bare numbers are only accepted in range.
pub fn extract_score(text: &str) -> Option<i32> {
    if let Some(value) = capture(&SCORE_TAG, text).or_else(|| capture(&SCORE_LOOSE, text)) {
        return Some(value.clamp(-LIMIT, LIMIT) as i32);
    }
    if let Some(value) = capture(&OUT_OF_TEN, text).and_then(in_range) {
        return Some(value);
    }
    capture(&LEADING_INT, text.trim()).and_then(in_range)
}
