//! Optional backend-assisted judgments on signed ethical criteria.
//!
//! The judge never fails: any missing client, backend error or unparseable
//! reply yields `None`, and the caller falls back to its keyword tally.

mod client;
mod extract;
mod prompt;

pub use extract::extract_score;

use crate::model::CompletionParams;
use crate::providers::llm::LlmClient;
use std::sync::Arc;
use tracing::debug;

pub const JUDGE_PARAMS: CompletionParams = CompletionParams::new(0.3, 150);

/// One criterion to judge for one proposed action.
#[derive(Debug, Clone, Copy)]
pub struct CriterionRequest<'a> {
    pub criterion: &'a str,
    pub description: &'a str,
    pub action: &'a str,
    pub context: &'a str,
}

#[derive(Clone)]
pub struct SemanticJudge {
    client: Option<Arc<dyn LlmClient>>,
    params: CompletionParams,
    enabled: bool,
}

impl SemanticJudge {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            client,
            params: JUDGE_PARAMS,
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None).with_enabled(false)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.client.is_some()
    }

    /// Score in `-10..=10`, or `None` when no judgment could be obtained.
    pub async fn score(&self, request: &CriterionRequest<'_>) -> Option<i32> {
        if !self.enabled {
            return None;
        }
        let client = self.client.as_ref()?;
        let prompt = prompt::build_prompt(request);

        let text = match client::call_judge(client.as_ref(), &prompt, &self.params).await {
            Ok(text) => text,
            Err(err) => {
                debug!(criterion = request.criterion, error = %err, "semantic judge unavailable");
                return None;
            }
        };

        let score = extract_score(&text);
        match score {
            Some(value) => debug!(criterion = request.criterion, score = value, "semantic score"),
            None => debug!(
                criterion = request.criterion,
                reply = %text.chars().take(100).collect::<String>(),
                "semantic reply had no usable score"
            ),
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::BackendError;
    use crate::providers::llm::fake::FakeClient;

    fn request() -> CriterionRequest<'static> {
        CriterionRequest {
            criterion: "truth",
            description: "honesty and transparency",
            action: "publish the audit",
            context: "",
        }
    }

    #[tokio::test]
    async fn returns_extracted_score() {
        let judge = SemanticJudge::new(Some(Arc::new(
            FakeClient::new("fake").with_response("SCORE: +7\nREASON: transparent"),
        )));
        assert!(judge.is_available());
        assert_eq!(judge.score(&request()).await, Some(7));
    }

    #[tokio::test]
    async fn zero_is_a_real_score() {
        let judge = SemanticJudge::new(Some(Arc::new(
            FakeClient::new("fake").with_response("SCORE: 0"),
        )));
        assert_eq!(judge.score(&request()).await, Some(0));
    }

    #[tokio::test]
    async fn none_without_client_error_or_parse() {
        assert_eq!(SemanticJudge::new(None).score(&request()).await, None);

        let failing = FakeClient::new("fake").push_error(BackendError::timeout("slow"));
        let judge = SemanticJudge::new(Some(Arc::new(failing)));
        assert_eq!(judge.score(&request()).await, None);

        let vague = FakeClient::new("fake").with_response("hard to say");
        let judge = SemanticJudge::new(Some(Arc::new(vague)));
        assert_eq!(judge.score(&request()).await, None);
    }

    #[tokio::test]
    async fn disabled_judge_never_calls_backend() {
        let client = FakeClient::new("fake").with_response("SCORE: 5");
        let calls = client.call_counter();
        let judge = SemanticJudge::new(Some(Arc::new(client))).with_enabled(false);
        assert!(!judge.is_available());
        assert_eq!(judge.score(&request()).await, None);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
