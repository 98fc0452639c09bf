use super::keywords::KeywordTally;
use super::tiers::TierTable;
use crate::parser::ParsedRecord;
use serde::{Deserialize, Serialize};

/// One contribution to a composite score, measured on a parsed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ScoreRule {
    /// Items in a list (or every sub-key of a nested section).
    Count { section: String, tiers: TierTable },
    /// Items under one sub-key of a nested section.
    NestedCount {
        section: String,
        sub_key: String,
        tiers: TierTable,
    },
    /// Character length of a text section.
    Length { section: String, tiers: TierTable },
    /// Character length of the shortest of several text sections.
    MinLength {
        sections: Vec<String>,
        tiers: TierTable,
    },
    Keywords {
        section: String,
        tally: KeywordTally,
    },
}

impl ScoreRule {
    pub fn count(section: &str, tiers: TierTable) -> Self {
        ScoreRule::Count {
            section: section.to_string(),
            tiers,
        }
    }

    pub fn nested_count(section: &str, sub_key: &str, tiers: TierTable) -> Self {
        ScoreRule::NestedCount {
            section: section.to_string(),
            sub_key: sub_key.to_string(),
            tiers,
        }
    }

    pub fn length(section: &str, tiers: TierTable) -> Self {
        ScoreRule::Length {
            section: section.to_string(),
            tiers,
        }
    }

    pub fn min_length(sections: &[&str], tiers: TierTable) -> Self {
        ScoreRule::MinLength {
            sections: sections.iter().map(|s| s.to_string()).collect(),
            tiers,
        }
    }

    pub fn keywords(section: &str, keywords: &[&str], weight: f64) -> Self {
        ScoreRule::Keywords {
            section: section.to_string(),
            tally: KeywordTally::new(keywords, weight),
        }
    }

    pub fn apply(&self, record: &ParsedRecord) -> f64 {
        match self {
            ScoreRule::Count { section, tiers } => tiers.eval_count(record.count(section)),
            ScoreRule::NestedCount {
                section,
                sub_key,
                tiers,
            } => tiers.eval_count(record.nested(section, sub_key).len()),
            ScoreRule::Length { section, tiers } => tiers.eval_count(record.text_len(section)),
            ScoreRule::MinLength { sections, tiers } => {
                let shortest = sections
                    .iter()
                    .map(|s| record.text_len(s))
                    .min()
                    .unwrap_or(0);
                tiers.eval_count(shortest)
            }
            ScoreRule::Keywords { section, tally } => tally.tally(record.text(section)),
        }
    }
}

/// `base + sum(rules)`, clamped to `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScorer {
    pub name: String,
    #[serde(default)]
    pub base: f64,
    pub rules: Vec<ScoreRule>,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "one")]
    pub max: f64,
}

fn one() -> f64 {
    1.0
}

impl CompositeScorer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base: 0.0,
            rules: Vec::new(),
            min: 0.0,
            max: 1.0,
        }
    }

    pub fn base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn rule(mut self, rule: ScoreRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn score(&self, record: &ParsedRecord) -> f64 {
        let raw = self.base + self.rules.iter().map(|r| r.apply(record)).sum::<f64>();
        raw.clamp(self.min, self.max)
    }
}
