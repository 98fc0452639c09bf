use super::{
    InputContract, Stage, StageFailure, StageId, StageOutcome, StageOutput, StageState, Verdict,
    PAYLOAD_INPUT,
};
use crate::errors::{BackendError, InputContractError};
use crate::gate::{AlignmentGate, AlignmentReport};
use crate::metrics::CounterUpdate;
use crate::model::{CompletionParams, LlmResponse};
use crate::parser::{self, MarkerSpec, ParsedRecord, ParsingDegradation};
use crate::payload::Payload;
use crate::providers::llm::LlmClient;
use crate::scoring::ScoreSet;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a stage derives from one parsed response.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub scores: ScoreSet,
    pub counters: CounterUpdate,
    /// Derived output fields beyond the raw sections.
    pub fields: Payload,
}

impl Evaluation {
    pub fn new(scores: ScoreSet) -> Self {
        Self {
            scores,
            ..Self::default()
        }
    }

    pub fn counters(mut self, counters: CounterUpdate) -> Self {
        self.counters = counters;
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key, value);
        self
    }
}

/// Static description of an LLM-backed stage.
///
/// Implementations hold no mutable state; [`LlmStage`] owns the metrics.
pub trait StageDefinition: Send + Sync {
    fn id(&self) -> StageId;

    fn contract(&self) -> InputContract;

    fn markers(&self) -> MarkerSpec;

    fn params(&self) -> CompletionParams;

    fn gate(&self) -> AlignmentGate;

    fn build_prompt(&self, input: &Payload, markers: &MarkerSpec) -> String;

    fn evaluate(&self, record: &ParsedRecord, input: &Payload) -> Evaluation;

    /// Sections, then derived fields, then scores, then the raw response.
    fn assemble(&self, record: &ParsedRecord, evaluation: &Evaluation, raw: &str) -> Payload {
        let mut out = Payload::from(record.to_json());
        out.extend(evaluation.fields.as_map().clone());
        out.extend(evaluation.scores.to_json());
        out.insert("raw_response", raw);
        out
    }

    fn verdict(&self, _output: &StageOutput) -> Verdict {
        Verdict::Proceed
    }
}

/// Runs a [`StageDefinition`] around one completion call per `process`.
pub struct LlmStage<D> {
    definition: D,
    client: Option<Arc<dyn LlmClient>>,
    markers: MarkerSpec,
    contract: InputContract,
    gate: AlignmentGate,
    params: CompletionParams,
    state: StageState,
}

impl<D: StageDefinition> LlmStage<D> {
    pub fn new(definition: D, client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            markers: definition.markers(),
            contract: definition.contract(),
            gate: definition.gate(),
            params: definition.params(),
            state: StageState::new(definition.id()),
            client,
            definition,
        }
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_markers(mut self, markers: MarkerSpec) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_gate(mut self, gate: AlignmentGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn definition(&self) -> &D {
        &self.definition
    }

    pub fn markers(&self) -> &MarkerSpec {
        &self.markers
    }

    pub fn params(&self) -> CompletionParams {
        self.params
    }

    async fn call_backend(&self, prompt: &str) -> Result<LlmResponse, BackendError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BackendError::not_configured(self.definition.id().name))?;
        client.complete(prompt, &self.params).await.map_err(|e| {
            let err = BackendError::from_anyhow(&e);
            if err.provider.is_none() {
                err.with_provider(client.provider_name())
            } else {
                err
            }
        })
    }
}

#[async_trait]
impl<D: StageDefinition + 'static> Stage for LlmStage<D> {
    fn id(&self) -> StageId {
        self.state.id()
    }

    async fn process(&mut self, input: &Payload) -> Result<StageOutcome, InputContractError> {
        let id = self.id();
        let start = Instant::now();

        if let Err(err) = self.contract.validate(id, input) {
            self.state
                .metrics_mut()
                .record_failure(start.elapsed(), PAYLOAD_INPUT, &err.to_string());
            warn!(stage = id.name, error = %err, "input contract violated");
            return Err(err);
        }

        let prompt = self.definition.build_prompt(input, &self.markers);
        debug!(stage = id.name, prompt_chars = prompt.len(), "prompt built");

        let response = match self.call_backend(&prompt).await {
            Ok(response) => response,
            Err(error) => {
                let duration = start.elapsed();
                self.state
                    .metrics_mut()
                    .record_failure(duration, PAYLOAD_INPUT, &error.to_string());
                warn!(stage = id.name, kind = %error.kind, error = %error.message, "backend call failed");
                return Ok(StageOutcome::Failed(StageFailure {
                    stage: id,
                    error,
                    duration,
                }));
            }
        };

        let record = parser::parse(&response.text, &self.markers);
        let degradation = record.degradation();
        match &degradation {
            Some(d @ ParsingDegradation::FallbackOnly { .. }) => {
                warn!(stage = id.name, degradation = %d, "response had no recognizable sections")
            }
            Some(d) => debug!(stage = id.name, degradation = %d, "partial response structure"),
            None => {}
        }

        let evaluation = self.definition.evaluate(&record, input);
        let duration = start.elapsed();
        let output_kind = if record.fallback_used() {
            "fallback_record"
        } else {
            "record"
        };
        self.state.metrics_mut().record_success(
            duration,
            PAYLOAD_INPUT,
            output_kind,
            &evaluation.counters,
        );

        let fields = self.definition.assemble(&record, &evaluation, &response.text);
        info!(
            stage = id.name,
            duration_ms = duration.as_millis() as u64,
            scores = ?evaluation.scores,
            "stage completed"
        );
        Ok(StageOutcome::Completed(StageOutput {
            stage: id,
            fields,
            scores: evaluation.scores,
            degradation,
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
        self.definition.verdict(output)
    }
}
