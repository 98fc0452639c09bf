use super::LlmClient;
use crate::errors::BackendError;
use crate::model::{CompletionParams, LlmResponse};
use crate::providers::network::check_outbound;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "openai";

pub struct OpenAIClient {
    pub model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

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
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> anyhow::Result<LlmResponse> {
        let url = self.endpoint();
        check_outbound(&url).map_err(|e| e.with_provider(PROVIDER))?;

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::invalid_response("chat completion response missing content")
                    .with_provider(PROVIDER)
            })?
            .to_string();

        let usage = json!({
            "input_tokens": json.pointer("/usage/prompt_tokens"),
            "output_tokens": json.pointer("/usage/completion_tokens"),
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

    #[tokio::test]
    #[serial]
    async fn openai_client_respects_network_deny_policy() {
        std::env::remove_var(NETWORK_POLICY_ENV);
        let _guard = NetworkPolicyGuard::deny("unit test");
        let client = OpenAIClient::new("gpt-4o-mini", "test-key");
        let err = client
            .complete("hello", &CompletionParams::new(0.0, 8))
            .await
            .expect_err("network deny policy should block outbound call");
        let typed = BackendError::from_anyhow(&err);
        assert_eq!(typed.kind, BackendErrorKind::Network);
        assert_eq!(typed.provider.as_deref(), Some("openai"));
        assert!(!typed.legacy_classified);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let client = OpenAIClient::new("m", "k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
