use crate::config::{BackendConfig, ProviderKind};
use crate::errors::ConfigError;
use crate::model::{CompletionParams, LlmResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod fake;
pub mod gemini;
pub mod openai;
pub mod tracing;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        params: &CompletionParams,
    ) -> anyhow::Result<LlmResponse>;

    fn provider_name(&self) -> &'static str;
}

/// Builds the configured client wrapped in request tracing.
///
/// Returns `Ok(None)` when the provider needs an API key and the key
/// variable is unset; stages then report the backend as not configured.
pub fn build_client(config: &BackendConfig) -> Result<Option<Arc<dyn LlmClient>>, ConfigError> {
    let timeout = config.timeout_secs.map(Duration::from_secs);
    let inner: Arc<dyn LlmClient> = match config.provider {
        ProviderKind::Fake => {
            let mut client = fake::FakeClient::new(config.model.as_str());
            if let Some(response) = &config.fake_response {
                client = client.with_response(response.as_str());
            }
            Arc::new(client)
        }
        ProviderKind::Openai => {
            let Some(api_key) = config.api_key() else {
                return Ok(None);
            };
            let mut client = openai::OpenAIClient::new(config.model.as_str(), api_key);
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url.as_str());
            }
            if let Some(timeout) = timeout {
                client = client
                    .with_timeout(timeout)
                    .map_err(|e| ConfigError(format!("openai client: {}", e)))?;
            }
            Arc::new(client)
        }
        ProviderKind::Gemini => {
            let Some(api_key) = config.api_key() else {
                return Ok(None);
            };
            let mut client = gemini::GeminiClient::new(config.model.as_str(), api_key);
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url.as_str());
            }
            if let Some(timeout) = timeout {
                client = client
                    .with_timeout(timeout)
                    .map_err(|e| ConfigError(format!("gemini client: {}", e)))?;
            }
            Arc::new(client)
        }
    };
    Ok(Some(Arc::new(tracing::TracingLlmClient::new(inner))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn fake_backend_is_always_available() {
        let config = BackendConfig {
            provider: ProviderKind::Fake,
            fake_response: Some("ANALYSIS: ok".into()),
            ..BackendConfig::default()
        };
        let client = build_client(&config).unwrap().expect("fake client");
        assert_eq!(client.provider_name(), "fake");
        let response = client
            .complete("hello", &CompletionParams::default())
            .await
            .unwrap();
        assert_eq!(response.text, "ANALYSIS: ok");
    }

    #[test]
    #[serial]
    fn missing_api_key_yields_no_client() {
        std::env::remove_var("CASCADE_TEST_MISSING_KEY");
        for provider in [ProviderKind::Openai, ProviderKind::Gemini] {
            let config = BackendConfig {
                provider,
                api_key_env: Some("CASCADE_TEST_MISSING_KEY".into()),
                ..BackendConfig::default()
            };
            assert!(build_client(&config).unwrap().is_none());
        }
    }

    #[test]
    #[serial]
    fn present_api_key_builds_http_client() {
        std::env::set_var("CASCADE_TEST_PRESENT_KEY", "sk-test");
        let config = BackendConfig {
            provider: ProviderKind::Gemini,
            model: "gemini-1.5-flash".into(),
            api_key_env: Some("CASCADE_TEST_PRESENT_KEY".into()),
            timeout_secs: Some(5),
            ..BackendConfig::default()
        };
        let client = build_client(&config).unwrap().expect("gemini client");
        assert_eq!(client.provider_name(), "gemini");
        std::env::remove_var("CASCADE_TEST_PRESENT_KEY");
    }
}
