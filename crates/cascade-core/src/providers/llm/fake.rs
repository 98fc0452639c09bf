use super::LlmClient;
use crate::errors::BackendError;
use crate::model::{CompletionParams, LlmResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<Result<String, BackendError>>,
    prompts: Vec<String>,
}

/// Scripted client for tests and offline runs.
///
/// Resolution order per call: queued script entries, then the first route
/// whose needle occurs in the prompt, then the fixed response.
#[derive(Debug)]
pub struct FakeClient {
    model: String,
    routes: Vec<(String, String)>,
    fixed_response: Option<String>,
    script: Mutex<Script>,
    calls: Arc<AtomicUsize>,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            routes: Vec::new(),
            fixed_response: None,
            script: Mutex::new(Script::default()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.fixed_response = Some(response.into());
        self
    }

    pub fn route(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.routes.push((needle.into(), response.into()));
        self
    }

    pub fn push_response(self, response: impl Into<String>) -> Self {
        self.lock().queue.push_back(Ok(response.into()));
        self
    }

    pub fn push_error(self, error: BackendError) -> Self {
        self.lock().queue.push_back(Err(error));
        self
    }

    /// Shared counter, still readable after the client moves into a stage.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.lock().prompts.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn resolve(&self, prompt: &str) -> Result<String, BackendError> {
        let mut script = self.lock();
        script.prompts.push(prompt.to_string());
        if let Some(next) = script.queue.pop_front() {
            return next;
        }
        drop(script);

        if let Some((_, response)) = self.routes.iter().find(|(needle, _)| prompt.contains(needle)) {
            return Ok(response.clone());
        }
        Ok(self
            .fixed_response
            .clone()
            .unwrap_or_else(|| "passed".to_string()))
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(
        &self,
        prompt: &str,
        _params: &CompletionParams,
    ) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = self.resolve(prompt)?;

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
