use serde::{Deserialize, Serialize};

/// Fixed vocabulary whose distinct hits each contribute `weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTally {
    pub keywords: Vec<String>,
    pub weight: f64,
}

impl KeywordTally {
    pub fn new(keywords: &[&str], weight: f64) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            weight,
        }
    }

    /// Number of distinct keywords present as substrings of `text`.
    pub fn hits(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| !k.is_empty() && lowered.contains(k.as_str()))
            .count()
    }

    pub fn tally(&self, text: &str) -> f64 {
        self.hits(text) as f64 * self.weight
    }

    pub fn any(&self, text: &str) -> bool {
        self.hits(text) > 0
    }
}

/// Sum of several tallies over the same text.
pub fn tally_all(tallies: &[KeywordTally], text: &str) -> f64 {
    tallies.iter().map(|t| t.tally(text)).sum()
}

/// How many of `groups` have at least one hit in `text`.
pub fn groups_present(groups: &[KeywordTally], text: &str) -> usize {
    groups.iter().filter(|g| g.any(text)).count()
}
