//! Framing pre-check for the action handed to the objective stage.
//!
//! The check looks for ideological bias in how the input is worded rather
//! than in what it proposes: loaded terms used one-sidedly, implicit
//! assumptions, missing perspectives, actors treated asymmetrically and
//! concepts a balanced account cannot leave out. Each finding carries a
//! severity; the weighted sum is the bias score and the input is accepted
//! when it stays within [`PurityThresholds`].

use cascade_core::config::PurityThresholds;
use cascade_core::scoring::KeywordTally;
use cascade_core::Payload;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;

/// Severity total that maps to a bias score of 1.0.
const SEVERITY_SCALE: f64 = 20.0;

/// Ratio above which one pole of a term family outweighs the other.
const IMBALANCE_RATIO: usize = 3;

/// More missing perspectives than this is a high-severity finding.
const MAX_MISSING_PERSPECTIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    LoadedTermsAsymmetry,
    LoadedTermsImbalance,
    ImplicitAssumption,
    MissingPerspectives,
    PerspectiveDepthImbalance,
    ActorTreatmentAsymmetry,
    CriticalOmission,
}

impl IssueKind {
    /// Advice that applies to every finding of this kind.
    fn general_advice(self) -> Option<&'static str> {
        match self {
            IssueKind::LoadedTermsAsymmetry => {
                Some("Replace loaded terms with neutral descriptive language")
            }
            IssueKind::ImplicitAssumption => Some("Make assumptions explicit and question them"),
            IssueKind::MissingPerspectives => Some("Research and add the missing perspectives"),
            IssueKind::ActorTreatmentAsymmetry => {
                Some("Apply the same analytical standard to every actor")
            }
            IssueKind::CriticalOmission => Some("Research and add the omitted concepts"),
            IssueKind::LoadedTermsImbalance | IssueKind::PerspectiveDepthImbalance => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BiasIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

impl BiasIssue {
    fn new(
        kind: IssueKind,
        severity: Severity,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            recommendation: recommendation.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Critical,
}

impl BiasLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            BiasLevel::Critical
        } else if score >= 0.5 {
            BiasLevel::High
        } else if score >= 0.3 {
            BiasLevel::Moderate
        } else if score >= 0.1 {
            BiasLevel::Low
        } else {
            BiasLevel::Minimal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurityReport {
    pub is_pure: bool,
    /// `1 - bias_score`.
    pub purity_score: f64,
    pub bias_score: f64,
    pub bias_level: BiasLevel,
    pub critical_issues: usize,
    pub issues: Vec<BiasIssue>,
    /// Deduplicated and sorted.
    pub recommendations: Vec<String>,
    pub status: String,
}

impl PurityReport {
    pub fn to_json(&self) -> Value {
        json!(self)
    }
}

struct TermFamily {
    name: &'static str,
    favourable: Regex,
    unfavourable: Regex,
}

struct Assumption {
    pattern: Regex,
    description: &'static str,
    severity: Severity,
}

struct Actor {
    name: &'static str,
    mention: Regex,
}

lazy_static! {
    static ref TERM_FAMILIES: Vec<TermFamily> = vec![
        TermFamily {
            name: "political",
            favourable: Regex::new(
                r"(?i)\b(?:democracia|democr[aá]tic[oa]s?|libre|libertad|l[ií]der|leg[ií]tim[oa]s?|presidente|democracy|democratic|free|freedom|leader|legitimate|president)\b"
            )
            .unwrap(),
            unfavourable: Regex::new(
                r"(?i)\b(?:dictad(?:or|ura)|r[ée]gimen|autoritari[oa]s?|tiran(?:o|[ií]a)s?|d[ée]spota|totalitari[oa]s?|opresor|ileg[ií]tim[oa]s?|dictator(?:ship)?|regime|authoritarian|tyrants?|tyranny|despot|totalitarian|oppressor|illegitimate)\b"
            )
            .unwrap(),
        },
        TermFamily {
            name: "economic",
            favourable: Regex::new(
                r"(?i)\b(?:capitalistas?|libre mercado|emprendedor|privad[oa]s?|capitalist|free market|entrepreneur|private)\b"
            )
            .unwrap(),
            unfavourable: Regex::new(
                r"(?i)\b(?:comunistas?|socialistas?|colectivistas?|planificad[oa]s?|estatistas?|communist|socialist|collectivist|statist|planned economy)\b"
            )
            .unwrap(),
        },
        TermFamily {
            name: "geopolitical",
            favourable: Regex::new(
                r"(?i)\b(?:aliados|mundo libre|comunidad internacional|allies|free world|international community)\b"
            )
            .unwrap(),
            unfavourable: Regex::new(
                r"(?i)\b(?:eje del mal|estados forajidos|axis of evil|rogue states?)\b"
            )
            .unwrap(),
        },
        TermFamily {
            name: "moral",
            favourable: Regex::new(
                r"(?i)\b(?:humanitari[oa]s?|pac[ií]fic[oa]s?|defensiv[oa]s?|proteger|humanitarian|peaceful|defensive|protect)\b"
            )
            .unwrap(),
            unfavourable: Regex::new(
                r"(?i)\b(?:terroristas?|extremistas?|radical(?:es)?|agresiv[oa]s?|hostil(?:es)?|terrorists?|extremists?|aggressive|hostile)\b"
            )
            .unwrap(),
        },
    ];
    static ref ASSUMPTIONS: Vec<Assumption> = vec![
        Assumption {
            pattern: Regex::new(r"(?is)democra(?:cia|cy).*(?:mejor|superior|[uú]nica|better|only)").unwrap(),
            description: "Assumes liberal democracy is superior without comparative analysis",
            severity: Severity::High,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:autoritari|authoritari).*(?:malo|represiv|negativ|bad|repressive)").unwrap(),
            description: "Assumes authoritarian government is negative regardless of context",
            severity: Severity::High,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:intervenci[oó]n|intervention).*(?:humanitari|necesari|necessary)").unwrap(),
            description: "Assumes intervention is humanitarian without questioning motives",
            severity: Severity::High,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:soberan[ií]a|sovereignty).*(?:excusa|pretexto|excuse|pretext)").unwrap(),
            description: "Delegitimizes sovereignty unilaterally",
            severity: Severity::Medium,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:\beeuu\b|\bee\.uu\b|estados unidos|united states|\busa\b).*(?:lidera|debe|\bleads?\b|\bmust\b)").unwrap(),
            description: "Treats United States leadership as natural or legitimate",
            severity: Severity::Medium,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:rusia|russia|china).*(?:malign|malicios|amenaza|threat)").unwrap(),
            description: "Characterizes non-western actors as threats per se",
            severity: Severity::High,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:reforma|reform).*(?:necesari|urgente|debe|necessary|urgent|\bmust\b)").unwrap(),
            description: "Assumes reform is needed without considering alternatives",
            severity: Severity::Low,
        },
        Assumption {
            pattern: Regex::new(r"(?is)(?:derechos humanos|human rights).*(?:occident|western|univers)").unwrap(),
            description: "Treats a western definition of human rights as universal",
            severity: Severity::Medium,
        },
    ];
    static ref ACTORS: Vec<Actor> = vec![
        Actor {
            name: "united_states",
            mention: Regex::new(r"(?i)\b(?:eeuu|ee\.uu|estados unidos|united states|washington|usa|u\.s)\b").unwrap(),
        },
        Actor {
            name: "russia",
            mention: Regex::new(r"(?i)\b(?:rusia|russia|mosc[uú]|moscow|kremlin|putin)\b").unwrap(),
        },
        Actor {
            name: "china",
            mention: Regex::new(r"(?i)\b(?:china|beijing|pek[ií]n|prc)\b").unwrap(),
        },
        Actor {
            name: "venezuela",
            mention: Regex::new(r"(?i)\bvenezuela\b").unwrap(),
        },
        Actor {
            name: "nato",
            mention: Regex::new(r"(?i)\b(?:otan|nato)\b").unwrap(),
        },
    ];
    static ref HOSTILE: Regex =
        Regex::new(r"(?i)\b(?:agresi[oó]n|aggression|agresiv|aggressive|hostil|amenaza|threat)").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?;]+(?:\s+|$)|\n+").unwrap();
}

/// Perspectives a balanced account mentions, with their synonyms.
const PERSPECTIVES: &[(&str, &[&str])] = &[
    ("official", &["oficialista", "official", "government"]),
    ("opposition", &["opositor", "opposition"]),
    ("regional", &["regional"]),
    ("western", &["occidental", "western"]),
    ("multipolar", &["multipolar"]),
    ("humanitarian", &["humanitari"]),
    ("neutral", &["neutral"]),
];

/// Concepts a balanced account cannot leave out.
const CRITICAL_CONCEPTS: &[(&str, &[&str])] = &[
    ("sanctions", &["sancion", "embargo", "bloqueo", "sanction", "blockade"]),
    (
        "sovereignty",
        &["soberanía", "soberania", "autodeterminación", "sovereignty", "self-determination"],
    ),
    (
        "historical_context",
        &["historia", "historial", "precedente", "history", "historical", "precedent"],
    ),
    (
        "economic_interests",
        &["petróleo", "recursos", "económicos", "intereses", "oil", "resources", "economic", "interests"],
    ),
    (
        "consequences",
        &["consecuencias", "efectos", "impacto", "consequences", "effects", "impact"],
    ),
    (
        "alternatives",
        &["alternativa", "opción", "síntesis", "alternative", "option", "synthesis"],
    ),
];

fn keyword_groups(groups: &[(&'static str, &[&str])]) -> Vec<(&'static str, KeywordTally)> {
    groups
        .iter()
        .map(|(name, words)| (*name, KeywordTally::new(words, 1.0)))
        .collect()
}

/// Every string value in `value`, one per line.
fn flatten(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) => items.iter().for_each(|v| flatten(v, out)),
        Value::Object(map) => map.values().for_each(|v| flatten(v, out)),
        _ => {}
    }
}

/// Scans a stage input for biased framing.
#[derive(Debug, Clone)]
pub struct PurityCheck {
    thresholds: PurityThresholds,
    perspectives: Vec<(&'static str, KeywordTally)>,
    concepts: Vec<(&'static str, KeywordTally)>,
}

impl Default for PurityCheck {
    fn default() -> Self {
        Self::new(PurityThresholds::default())
    }
}

impl PurityCheck {
    pub fn new(thresholds: PurityThresholds) -> Self {
        Self {
            thresholds,
            perspectives: keyword_groups(PERSPECTIVES),
            concepts: keyword_groups(CRITICAL_CONCEPTS),
        }
    }

    pub fn thresholds(&self) -> PurityThresholds {
        self.thresholds
    }

    /// Scans every text value of `input`. A `positions` object, when present,
    /// is also checked for uneven depth between the positions it lists.
    pub fn scan(&self, input: &Payload) -> PurityReport {
        let mut text = String::new();
        for value in input.as_map().values() {
            flatten(value, &mut text);
        }
        self.scan_text(&text, input.object("positions"))
    }

    pub fn scan_text(&self, text: &str, positions: Option<&Map<String, Value>>) -> PurityReport {
        let mut issues = Vec::new();
        issues.extend(loaded_terms(text));
        issues.extend(implicit_assumptions(text));
        issues.extend(self.missing_perspectives(text));
        issues.extend(positions.and_then(position_depth));
        issues.extend(actor_symmetry(text));
        issues.extend(self.critical_omissions(text));
        self.report(issues)
    }

    fn report(&self, issues: Vec<BiasIssue>) -> PurityReport {
        let severity: u32 = issues.iter().map(|i| i.severity.weight()).sum();
        let bias_score = (f64::from(severity) / SEVERITY_SCALE).min(1.0);
        let critical_issues = issues
            .iter()
            .filter(|i| i.severity == Severity::High)
            .count();
        let is_pure = bias_score <= self.thresholds.max_bias_score
            && critical_issues <= self.thresholds.max_critical_issues;

        let mut recommendations: BTreeSet<String> =
            issues.iter().map(|i| i.recommendation.clone()).collect();
        recommendations.extend(
            issues
                .iter()
                .filter_map(|i| i.kind.general_advice())
                .map(str::to_string),
        );

        let status = if is_pure {
            "framing accepted".to_string()
        } else {
            format!(
                "biased framing: bias {:.2} (max {:.2}), {} critical issues (max {})",
                bias_score,
                self.thresholds.max_bias_score,
                critical_issues,
                self.thresholds.max_critical_issues
            )
        };

        PurityReport {
            is_pure,
            purity_score: 1.0 - bias_score,
            bias_score,
            bias_level: BiasLevel::from_score(bias_score),
            critical_issues,
            issues,
            recommendations: recommendations.into_iter().collect(),
            status,
        }
    }

    fn missing_perspectives(&self, text: &str) -> Option<BiasIssue> {
        let missing: Vec<&str> = self
            .perspectives
            .iter()
            .filter(|(_, words)| !words.any(text))
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            return None;
        }
        let severity = if missing.len() > MAX_MISSING_PERSPECTIVES {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(BiasIssue::new(
            IssueKind::MissingPerspectives,
            severity,
            format!("missing perspectives: {}", missing.join(", ")),
            "Include every relevant perspective with equal depth",
        ))
    }

    fn critical_omissions(&self, text: &str) -> Vec<BiasIssue> {
        self.concepts
            .iter()
            .filter(|(_, words)| !words.any(text))
            .map(|(concept, _)| {
                BiasIssue::new(
                    IssueKind::CriticalOmission,
                    Severity::Medium,
                    format!("critical concept omitted: {}", concept),
                    format!("Include an analysis of {}", concept.replace('_', " ")),
                )
            })
            .collect()
    }
}

fn loaded_terms(text: &str) -> Vec<BiasIssue> {
    let mut issues = Vec::new();
    for family in TERM_FAMILIES.iter() {
        let favourable = family.favourable.find_iter(text).count();
        let unfavourable = family.unfavourable.find_iter(text).count();
        if unfavourable > 0 && favourable == 0 {
            issues.push(BiasIssue::new(
                IssueKind::LoadedTermsAsymmetry,
                Severity::High,
                format!(
                    "one-sided {} terms: {} unfavourable, 0 favourable",
                    family.name, unfavourable
                ),
                format!("Balance {} terms or use neutral language", family.name),
            ));
        } else if favourable > unfavourable * IMBALANCE_RATIO
            || unfavourable > favourable * IMBALANCE_RATIO
        {
            issues.push(BiasIssue::new(
                IssueKind::LoadedTermsImbalance,
                Severity::Medium,
                format!(
                    "uneven {} terms: {} favourable vs {} unfavourable",
                    family.name, favourable, unfavourable
                ),
                format!("Review the balance of {} terms", family.name),
            ));
        }
    }
    issues
}

fn implicit_assumptions(text: &str) -> Vec<BiasIssue> {
    ASSUMPTIONS
        .iter()
        .filter(|a| a.pattern.is_match(text))
        .map(|a| {
            BiasIssue::new(
                IssueKind::ImplicitAssumption,
                a.severity,
                a.description,
                "Question this assumption or present alternatives",
            )
        })
        .collect()
}

fn position_depth(positions: &Map<String, Value>) -> Option<BiasIssue> {
    let lengths: Vec<usize> = positions
        .values()
        .map(|v| v.to_string().chars().count())
        .collect();
    let max = *lengths.iter().max()?;
    let min = *lengths.iter().min()?;
    (max > min * IMBALANCE_RATIO).then(|| {
        BiasIssue::new(
            IssueKind::PerspectiveDepthImbalance,
            Severity::Medium,
            format!("positions analysed unevenly: {} vs {} chars", max, min),
            "Give every position the same analytical depth",
        )
    })
}

/// Compares, per mentioned actor, the share of its sentences that are hostile.
fn actor_symmetry(text: &str) -> Option<BiasIssue> {
    let sentences: Vec<&str> = SENTENCE_END
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .collect();

    let ratios: Vec<(&str, f64)> = ACTORS
        .iter()
        .filter_map(|actor| {
            let mentioned: Vec<&&str> = sentences
                .iter()
                .filter(|s| actor.mention.is_match(s))
                .collect();
            if mentioned.is_empty() {
                return None;
            }
            let hostile = mentioned.iter().filter(|s| HOSTILE.is_match(s)).count();
            Some((actor.name, hostile as f64 / mentioned.len() as f64))
        })
        .collect();
    if ratios.len() < 2 {
        return None;
    }

    let max = ratios.iter().map(|(_, r)| *r).fold(0.0, f64::max);
    let min = ratios.iter().map(|(_, r)| *r).fold(1.0, f64::min);
    if max == 0.0 || min > 0.0 {
        return None;
    }
    let named = |ratio: f64| -> Vec<&str> {
        ratios
            .iter()
            .filter(|(_, r)| *r == ratio)
            .map(|(name, _)| *name)
            .collect()
    };
    Some(BiasIssue::new(
        IssueKind::ActorTreatmentAsymmetry,
        Severity::High,
        format!(
            "actors [{}] framed as hostile, [{}] neutrally",
            named(max).join(", "),
            named(min).join(", ")
        ),
        "Apply the same critical standard to every actor",
    ))
}
