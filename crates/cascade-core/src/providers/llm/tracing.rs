use super::LlmClient;
use crate::errors::BackendError;
use crate::model::{CompletionParams, LlmResponse};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info_span, Instrument};

/// Wraps a client in an `llm.request` span carrying model, token usage and
/// error details. Prompt text is never recorded.
pub struct TracingLlmClient {
    inner: Arc<dyn LlmClient>,
}

impl TracingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmClient for TracingLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> anyhow::Result<LlmResponse> {
        let span = info_span!(
            "llm.request",
            provider = self.inner.provider_name(),
            temperature = params.temperature as f64,
            max_tokens = params.max_tokens,
            prompt_chars = prompt.len(),
            model = tracing::field::Empty,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            error = tracing::field::Empty,
            error_kind = tracing::field::Empty,
        );

        async move {
            let start = std::time::Instant::now();
            let result = self.inner.complete(prompt, params).await;
            let span = tracing::Span::current();
            span.record("duration_ms", start.elapsed().as_millis() as u64);

            match &result {
                Ok(resp) => {
                    span.record("model", resp.model.as_str());
                    if let Some(usage) = resp.meta.get("usage") {
                        if let Some(i) = usage.get("input_tokens").and_then(|v| v.as_u64()) {
                            span.record("input_tokens", i);
                        }
                        if let Some(o) = usage.get("output_tokens").and_then(|v| v.as_u64()) {
                            span.record("output_tokens", o);
                        }
                    }
                }
                Err(e) => {
                    let typed = BackendError::from_anyhow(e);
                    span.record("error", typed.message.as_str());
                    span.record("error_kind", tracing::field::display(typed.kind));
                }
            }

            result
        }
        .instrument(span)
        .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
