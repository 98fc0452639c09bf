use crate::errors::BackendError;
use crate::model::CompletionParams;
use crate::providers::llm::LlmClient;

pub(crate) async fn call_judge(
    client: &dyn LlmClient,
    prompt: &str,
    params: &CompletionParams,
) -> Result<String, BackendError> {
    let resp = client
        .complete(prompt, params)
        .await
        .map_err(|e| BackendError::from_anyhow(&e))?;
    let text = resp.text.trim();
    if text.is_empty() {
        return Err(BackendError::invalid_response("empty judge reply").with_provider(resp.provider));
    }
    Ok(text.to_string())
}
