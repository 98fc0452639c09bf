use super::LlmClient;
use crate::errors::BackendError;
use crate::model::{CompletionParams, LlmResponse};
use crate::providers::network::check_outbound;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "gemini";

pub struct GeminiClient {
    pub model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, BackendError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::from_reqwest(&e, PROVIDER))?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

/// Concatenates every text part of the first candidate.
fn candidate_text(json: &Value) -> Option<String> {
    let parts = json.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> anyhow::Result<LlmResponse> {
        let url = self.endpoint();
        check_outbound(&url).map_err(|e| e.with_provider(PROVIDER))?;

        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_tokens,
            },
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, PROVIDER))?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), PROVIDER, error_text).into());
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::from_reqwest(&e, PROVIDER))?;

        let text = candidate_text(&json).ok_or_else(|| {
            let reason = json
                .pointer("/candidates/0/finishReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates");
            BackendError::invalid_response(format!("generateContent returned no text ({})", reason))
                .with_provider(PROVIDER)
        })?;

        let usage = json!({
            "input_tokens": json.pointer("/usageMetadata/promptTokenCount"),
            "output_tokens": json.pointer("/usageMetadata/candidatesTokenCount"),
        });

        Ok(LlmResponse {
            text,
            provider: PROVIDER.to_string(),
            model: self.model.clone(),
            meta: json!({ "usage": usage }),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendErrorKind;
    use crate::providers::network::{NetworkPolicyGuard, NETWORK_POLICY_ENV};
    use serial_test::serial;

    #[test]
    fn extracts_all_text_parts() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "ANALYSIS:" }, { "text": " fine" }] } }]
        });
        assert_eq!(candidate_text(&json).as_deref(), Some("ANALYSIS: fine"));
        assert!(candidate_text(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn endpoint_names_model() {
        let client = GeminiClient::new("gemini-1.5-flash", "k");
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[tokio::test]
    #[serial]
    async fn gemini_client_respects_network_deny_policy() {
        std::env::remove_var(NETWORK_POLICY_ENV);
        let _guard = NetworkPolicyGuard::deny("unit test");
        let err = GeminiClient::new("gemini-1.5-flash", "k")
            .complete("hello", &CompletionParams::default())
            .await
            .unwrap_err();
        let typed = BackendError::from_anyhow(&err);
        assert_eq!(typed.kind, BackendErrorKind::Network);
        assert_eq!(typed.provider.as_deref(), Some("gemini"));
    }
}
