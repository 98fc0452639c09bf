use super::CriterionRequest;

pub(crate) fn build_prompt(request: &CriterionRequest<'_>) -> String {
    let context = if request.context.trim().is_empty() {
        "(none)"
    } else {
        request.context
    };
    format!(
        "Rate the proposed action on a single ethical criterion.\n\n\
         Criterion: {}\n\
         Meaning: {}\n\n\
         Action: {}\n\
         Context: {}\n\n\
         Use a scale from -10 (strongly violates) to +10 (strongly upholds); 0 is neutral.\n\
         Reply exactly as:\n\
         SCORE: [number]\n\
         REASON: [one sentence]",
        request.criterion, request.description, request.action, context
    )
}
