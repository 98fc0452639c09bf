//! Stage 1: signed ethical criteria over the proposed action.
//!
//! Unlike the other stages this one does not parse a generated response.
//! Each criterion is a keyword tally over the action text, optionally
//! replaced by a semantic judgment, and the normalized sum decides whether
//! the rest of the pipeline runs at all.

use cascade_core::gate::{AlignmentGate, AlignmentReport, GateMetric};
use cascade_core::judge::{CriterionRequest, SemanticJudge};
use crate::purity::{PurityCheck, PurityReport};
use cascade_core::metrics::CounterUpdate;
use cascade_core::scoring::{normalize_signed, tally_all, CriterionScore, KeywordTally, ScoreSet};
use cascade_core::stage::{
    FieldKind, FieldSpec, InputContract, Stage, StageOutcome, StageOutput, StageState, Verdict,
    PAYLOAD_INPUT,
};
use cascade_core::{InputContractError, Payload, StageId};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const OBJECTIVE: StageId = StageId::new(1, "objective");

/// Minimum normalized alignment for the action to proceed.
pub const ALIGNMENT_THRESHOLD: f64 = 0.6;

const MAX_TOTAL: f64 = (Criterion::ALL.len() as i32 * cascade_core::scoring::CRITERION_LIMIT) as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Suffering,
    FreeWill,
    Harmony,
    JusticeMercy,
    Truth,
}

/// Which input fields a criterion reads besides the action itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    ActionAndOutcome,
    ActionAndContext,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Suffering,
        Criterion::FreeWill,
        Criterion::Harmony,
        Criterion::JusticeMercy,
        Criterion::Truth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Criterion::Suffering => "suffering",
            Criterion::FreeWill => "free_will",
            Criterion::Harmony => "harmony",
            Criterion::JusticeMercy => "justice_mercy",
            Criterion::Truth => "truth",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Criterion::Suffering => "Suffering reduction",
            Criterion::FreeWill => "Respect for free will",
            Criterion::Harmony => "Harmony",
            Criterion::JusticeMercy => "Justice with mercy",
            Criterion::Truth => "Truth",
        }
    }

    fn suggestion(self) -> &'static str {
        match self {
            Criterion::Suffering => "Minimize harm to everyone affected",
            Criterion::FreeWill => "Respect autonomy and the freedom to choose",
            Criterion::Harmony => "Favour collaboration over conflict",
            Criterion::JusticeMercy => "Balance justice with compassion",
            Criterion::Truth => "Prioritize transparency and honesty",
        }
    }

    fn scope(self) -> Scope {
        match self {
            Criterion::Suffering | Criterion::Harmony | Criterion::Truth => Scope::ActionAndOutcome,
            Criterion::FreeWill | Criterion::JusticeMercy => Scope::ActionAndContext,
        }
    }

    /// Criteria the semantic judge is consulted on, with what they mean.
    fn judge_description(self) -> Option<&'static str> {
        match self {
            Criterion::JusticeMercy => Some(
                "fairness and impartiality tempered by compassion and clemency, \
                 as opposed to cruelty or revenge",
            ),
            Criterion::Truth => Some(
                "transparency, honesty and authenticity, as opposed to manipulation, \
                 concealment or falsehood",
            ),
            _ => None,
        }
    }

    fn vocabulary(self) -> Vec<KeywordTally> {
        match self {
            Criterion::Suffering => vec![
                KeywordTally::new(
                    &[
                        "ayuda", "cura", "alivia", "mejora", "beneficia", "florece", "eleva",
                        "help", "heal", "reliev", "improv", "benefit", "flourish", "uplift",
                    ],
                    2.0,
                ),
                KeywordTally::new(
                    &[
                        "daña", "hiere", "perjudica", "destruye", "sufre", "dolor", "harm",
                        "hurt", "damag", "destroy", "suffer", "pain",
                    ],
                    -3.0,
                ),
            ],
            Criterion::FreeWill => vec![
                KeywordTally::new(
                    &[
                        "elegir", "decidir", "consenso", "voluntario", "autonomía", "autonomia",
                        "choose", "choice", "decide", "consent", "voluntary", "autonomy",
                    ],
                    3.0,
                ),
                KeywordTally::new(
                    &[
                        "forzar", "obligar", "coaccionar", "manipular", "engañar", "forced",
                        "forcing", "coerc", "compel", "manipulat", "deceiv",
                    ],
                    -4.0,
                ),
            ],
            Criterion::Harmony => vec![
                KeywordTally::new(
                    &[
                        "paz", "unión", "union", "colabora", "armonía", "armonia", "coopera",
                        "reconcilia", "peace", "unity", "collaborat", "harmony", "cooperat",
                        "reconcil",
                    ],
                    2.0,
                ),
                KeywordTally::new(
                    &[
                        "conflicto", "división", "division", "guerra", "enfrentamiento",
                        "hostilidad", "conflict", "divisive", "warfare", "confrontation",
                        "hostility",
                    ],
                    -3.0,
                ),
            ],
            Criterion::JusticeMercy => vec![
                KeywordTally::new(
                    &[
                        "justo", "equitativo", "imparcial", "correcto", "fair", "equitable",
                        "impartial", "justice",
                    ],
                    2.0,
                ),
                KeywordTally::new(
                    &[
                        "misericordia", "compasión", "compasion", "perdón", "perdon",
                        "clemencia", "bondad", "mercy", "compassion", "forgiv", "clemency",
                        "kindness",
                    ],
                    2.0,
                ),
                KeywordTally::new(
                    &[
                        "cruel", "venganza", "castigo excesivo", "implacable", "revenge",
                        "vengeance", "excessive punishment", "ruthless",
                    ],
                    -5.0,
                ),
            ],
            Criterion::Truth => vec![
                KeywordTally::new(
                    &[
                        "verdad", "honesto", "transparente", "auténtico", "autentico",
                        "sincero", "truth", "honest", "transparen", "authentic", "sincere",
                    ],
                    3.0,
                ),
                KeywordTally::new(
                    &[
                        "mentira", "engaño", "engano", "falso", "ocultar", "manipular",
                        "lying", "deceiv", "false", "conceal", "manipulat",
                    ],
                    -5.0,
                ),
            ],
        }
    }
}

/// Result of judging one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectiveAssessment {
    pub aligned: bool,
    pub alignment_score: f64,
    pub detailed_scores: BTreeMap<Criterion, CriterionScore>,
    /// Criteria whose score came from the semantic judge.
    pub judged: Vec<Criterion>,
    pub reasoning: String,
    pub suggested_modifications: Vec<String>,
}

impl ObjectiveAssessment {
    fn from_scores(detailed_scores: BTreeMap<Criterion, CriterionScore>, judged: Vec<Criterion>) -> Self {
        let total: i32 = detailed_scores.values().map(|s| s.value()).sum();
        let alignment_score = normalize_signed(f64::from(total), MAX_TOTAL);
        let aligned = alignment_score >= ALIGNMENT_THRESHOLD;

        let mut reasoning = format!("Overall alignment: {:.0}%", alignment_score * 100.0);
        for (criterion, score) in &detailed_scores {
            reasoning.push_str(&format!("\n- {}: {}/10", criterion.label(), score.value()));
        }

        let suggested_modifications = if aligned {
            Vec::new()
        } else {
            detailed_scores
                .iter()
                .filter(|(_, score)| score.is_negative())
                .map(|(criterion, _)| criterion.suggestion().to_string())
                .collect()
        };

        Self {
            aligned,
            alignment_score,
            detailed_scores,
            judged,
            reasoning,
            suggested_modifications,
        }
    }

    fn to_payload(&self) -> Payload {
        let detailed: Map<String, Value> = self
            .detailed_scores
            .iter()
            .map(|(c, s)| (c.name().to_string(), json!(s.value())))
            .collect();
        Payload::new()
            .with("aligned", self.aligned)
            .with("alignment_score", self.alignment_score)
            .with("detailed_scores", detailed)
            .with(
                "semantic_criteria",
                self.judged.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .with("reasoning", self.reasoning.as_str())
            .with("suggested_modifications", self.suggested_modifications.clone())
    }
}

pub struct ObjectiveStage {
    judge: SemanticJudge,
    vocabulary: Vec<(Criterion, Vec<KeywordTally>)>,
    contract: InputContract,
    gate: AlignmentGate,
    purity: Option<PurityCheck>,
    state: StageState,
}

fn objective_gate(purity_checked: bool) -> AlignmentGate {
    let gate = AlignmentGate::new("fundamental objective active")
        .observe("alignment_rate", GateMetric::Ratio("confirmations".into()));
    if purity_checked {
        gate.observe("purity_rate", GateMetric::Ratio("pure_inputs".into()))
    } else {
        gate
    }
}

impl ObjectiveStage {
    pub fn new(judge: SemanticJudge) -> Self {
        Self {
            judge,
            vocabulary: Criterion::ALL.iter().map(|c| (*c, c.vocabulary())).collect(),
            contract: InputContract::new()
                .field(FieldSpec::required("action", FieldKind::Text).non_empty())
                .field(FieldSpec::optional("context", FieldKind::Text))
                .field(FieldSpec::optional("expected_outcome", FieldKind::Text)),
            gate: objective_gate(false),
            purity: None,
            state: StageState::new(OBJECTIVE),
        }
    }

    /// Keyword tallies only; never calls a backend.
    pub fn keyword_only() -> Self {
        Self::new(SemanticJudge::disabled())
    }

    /// Scans the framing of every input before it is allowed to proceed.
    pub fn with_purity(mut self, check: PurityCheck) -> Self {
        self.gate = objective_gate(true);
        self.purity = Some(check);
        self
    }

    pub fn purity(&self) -> Option<&PurityCheck> {
        self.purity.as_ref()
    }

    pub fn judge(&self) -> &SemanticJudge {
        &self.judge
    }

    pub fn keyword_score(&self, criterion: Criterion, text: &str) -> CriterionScore {
        let tallies = self
            .vocabulary
            .iter()
            .find(|(c, _)| *c == criterion)
            .map(|(_, t)| t.as_slice())
            .unwrap_or_default();
        CriterionScore::from_tally(tally_all(tallies, text))
    }

    pub async fn assess(&self, input: &Payload) -> ObjectiveAssessment {
        let action = input.text("action");
        let context = input.text("context");
        let outcome = input.text("expected_outcome");

        let mut scores = BTreeMap::new();
        let mut judged = Vec::new();
        for criterion in Criterion::ALL {
            let text = match criterion.scope() {
                Scope::ActionAndOutcome => format!("{action} {outcome}"),
                Scope::ActionAndContext => format!("{action} {context}"),
            };

            let semantic = match criterion.judge_description() {
                Some(description) => {
                    self.judge
                        .score(&CriterionRequest {
                            criterion: criterion.name(),
                            description,
                            action,
                            context,
                        })
                        .await
                }
                None => None,
            };

            let score = match semantic {
                Some(value) => {
                    judged.push(criterion);
                    CriterionScore::new(value)
                }
                None => {
                    let score = self.keyword_score(criterion, &text);
                    if criterion.judge_description().is_some() && self.judge.is_available() {
                        debug!(criterion = criterion.name(), score = score.value(), "fell back to keyword tally");
                    }
                    score
                }
            };
            scores.insert(criterion, score);
        }

        ObjectiveAssessment::from_scores(scores, judged)
    }
}

#[async_trait]
impl Stage for ObjectiveStage {
    fn id(&self) -> StageId {
        OBJECTIVE
    }

    async fn process(&mut self, input: &Payload) -> Result<StageOutcome, InputContractError> {
        let start = Instant::now();
        if let Err(err) = self.contract.validate(OBJECTIVE, input) {
            self.state
                .metrics_mut()
                .record_failure(start.elapsed(), PAYLOAD_INPUT, &err.to_string());
            warn!(stage = OBJECTIVE.name, error = %err, "input contract violated");
            return Err(err);
        }

        let assessment = self.assess(input).await;
        let purity: Option<PurityReport> = self.purity.as_ref().map(|check| check.scan(input));
        let duration = start.elapsed();
        let mut counters = CounterUpdate::new()
            .count_if("confirmations", assessment.aligned)
            .count_if("violations", !assessment.aligned);
        if let Some(report) = &purity {
            counters = counters
                .count_if("pure_inputs", report.is_pure)
                .count_if("biased_inputs", !report.is_pure);
        }
        self.state
            .metrics_mut()
            .record_success(duration, PAYLOAD_INPUT, "assessment", &counters);

        if assessment.aligned {
            info!(
                stage = OBJECTIVE.name,
                alignment = assessment.alignment_score,
                "action aligned"
            );
        } else {
            warn!(
                stage = OBJECTIVE.name,
                alignment = assessment.alignment_score,
                suggestions = assessment.suggested_modifications.len(),
                "action not aligned"
            );
        }

        let mut fields = assessment.to_payload();
        let mut scores = ScoreSet::new().with("alignment_score", assessment.alignment_score);
        if let Some(report) = purity {
            if !report.is_pure {
                warn!(
                    stage = OBJECTIVE.name,
                    bias = report.bias_score,
                    critical = report.critical_issues,
                    "biased framing"
                );
            }
            scores = scores.with("purity_score", report.purity_score);
            fields.insert("purity", report.to_json());
        }

        Ok(StageOutcome::Completed(StageOutput {
            stage: OBJECTIVE,
            fields,
            scores,
            degradation: None,
            duration,
        }))
    }

    fn validate(&self) -> AlignmentReport {
        self.gate.evaluate(&self.state)
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }

    fn verdict(&self, output: &StageOutput) -> Verdict {
        let aligned = output.fields.flag("aligned");
        let biased = output
            .fields
            .object("purity")
            .filter(|p| p.get("is_pure").and_then(Value::as_bool) == Some(false));
        if aligned && biased.is_none() {
            return Verdict::Proceed;
        }

        let mut reasons = Vec::new();
        let mut suggested_modifications = Vec::new();
        if !aligned {
            reasons.push(format!(
                "alignment {:.2} below {:.2}",
                output.fields.score("alignment_score"),
                ALIGNMENT_THRESHOLD
            ));
            suggested_modifications.extend(output.fields.list("suggested_modifications"));
        }
        if let Some(purity) = biased {
            reasons.push(
                purity
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("biased framing")
                    .to_string(),
            );
            if let Some(recommendations) = purity.get("recommendations").and_then(Value::as_array) {
                suggested_modifications
                    .extend(recommendations.iter().filter_map(Value::as_str).map(str::to_string));
            }
        }
        Verdict::Reject {
            reason: reasons.join("; "),
            suggested_modifications,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::providers::llm::fake::FakeClient;
    use std::sync::Arc;

    fn input(action: &str) -> Payload {
        Payload::new().with("action", action)
    }

    #[test]
    fn keyword_scores_are_clamped() {
        let stage = ObjectiveStage::keyword_only();
        let flood = "lying deceive false conceal manipulate mentira engaño falso ocultar";
        assert_eq!(stage.keyword_score(Criterion::Truth, flood).value(), -10);
        assert_eq!(stage.keyword_score(Criterion::Truth, "an honest account").value(), 3);
    }

    #[tokio::test]
    async fn benevolent_action_is_aligned() {
        let stage = ObjectiveStage::keyword_only();
        let assessment = stage
            .assess(
                &input("Help farmers heal degraded soil through voluntary, collaborative and transparent peace-building")
                    .with("expected_outcome", "communities flourish and improve their harvests")
                    .with("context", "families choose freely and fair rules apply"),
            )
            .await;

        assert!(assessment.aligned, "{}", assessment.reasoning);
        assert!(assessment.suggested_modifications.is_empty());
        assert!(assessment.reasoning.starts_with("Overall alignment:"));
        assert!(assessment.judged.is_empty());
    }

    #[tokio::test]
    async fn harmful_action_gets_one_suggestion_per_negative_criterion() {
        let stage = ObjectiveStage::keyword_only();
        let assessment = stage
            .assess(&input("Destroy the village and conceal the damage with lying reports; forced relocation"))
            .await;

        assert!(!assessment.aligned);
        let negatives = assessment
            .detailed_scores
            .values()
            .filter(|s| s.is_negative())
            .count();
        assert_eq!(assessment.suggested_modifications.len(), negatives);
        assert!(assessment
            .suggested_modifications
            .contains(&"Prioritize transparency and honesty".to_string()));
    }

    #[tokio::test]
    async fn semantic_score_replaces_tally_even_when_zero() {
        let client = FakeClient::new("judge").with_response("SCORE: 0\nREASON: neutral");
        let stage = ObjectiveStage::new(SemanticJudge::new(Some(Arc::new(client))));
        let assessment = stage.assess(&input("an honest and transparent audit")).await;

        assert_eq!(assessment.detailed_scores[&Criterion::Truth].value(), 0);
        assert_eq!(assessment.judged, vec![Criterion::JusticeMercy, Criterion::Truth]);
    }

    #[tokio::test]
    async fn rejection_verdict_names_alignment() {
        let mut stage = ObjectiveStage::keyword_only();
        let outcome = stage
            .process(&input("cruel revenge and warfare to destroy and hurt"))
            .await
            .unwrap();
        let output = outcome.output().unwrap();

        match stage.verdict(output) {
            Verdict::Reject {
                reason,
                suggested_modifications,
            } => {
                assert!(reason.starts_with("alignment 0."));
                assert!(reason.ends_with("below 0.60"));
                assert!(!suggested_modifications.is_empty());
            }
            Verdict::Proceed => panic!("expected rejection"),
        }
        assert_eq!(stage.state().metrics().counter("violations"), 1);
        assert!(stage.validate().is_aligned);
    }

    #[tokio::test]
    async fn biased_framing_rejects_an_aligned_action() {
        let mut stage = ObjectiveStage::keyword_only().with_purity(PurityCheck::default());
        let outcome = stage
            .process(&input(
                "Help farmers heal degraded soil through voluntary, collaborative and transparent \
                 peace-building; the regime must reform and the free world leads",
            ))
            .await
            .unwrap();
        let output = outcome.output().unwrap();
        assert!(output.fields.flag("aligned"));
        let purity = output.fields.object("purity").unwrap();
        assert_eq!(purity["is_pure"], json!(false));
        assert!(output.scores.get_or_zero("purity_score") < 0.7);

        match stage.verdict(output) {
            Verdict::Reject {
                reason,
                suggested_modifications,
            } => {
                assert!(reason.starts_with("biased framing: bias"), "{reason}");
                assert!(suggested_modifications
                    .contains(&"Research and add the missing perspectives".to_string()));
            }
            Verdict::Proceed => panic!("expected rejection"),
        }
        assert_eq!(stage.state().metrics().counter("biased_inputs"), 1);
        assert_eq!(stage.state().metrics().counter("pure_inputs"), 0);
    }

    #[tokio::test]
    async fn balanced_framing_proceeds_with_a_report() {
        let mut stage = ObjectiveStage::keyword_only().with_purity(PurityCheck::new(
            cascade_core::config::PurityThresholds {
                max_bias_score: 1.0,
                max_critical_issues: 7,
            },
        ));
        let outcome = stage
            .process(&input("Help families heal through voluntary, transparent and collaborative care"))
            .await
            .unwrap();
        let output = outcome.output().unwrap();

        assert_eq!(stage.verdict(output), Verdict::Proceed);
        assert_eq!(output.fields.object("purity").unwrap()["is_pure"], json!(true));
        assert_eq!(stage.state().metrics().counter("pure_inputs"), 1);
    }

    #[tokio::test]
    async fn without_purity_no_report_is_attached() {
        let mut stage = ObjectiveStage::keyword_only();
        let outcome = stage.process(&input("Help families heal")).await.unwrap();
        assert!(outcome.output().unwrap().fields.get("purity").is_none());
        assert!(stage.purity().is_none());
    }

    #[tokio::test]
    async fn missing_action_is_a_contract_error() {
        let mut stage = ObjectiveStage::keyword_only();
        let err = stage.process(&Payload::new()).await.unwrap_err();
        assert_eq!(err.field(), Some("action"));
        assert_eq!(stage.state().metrics().activations(), 0);
        assert_eq!(stage.state().metrics().history().len(), 1);
    }
}
