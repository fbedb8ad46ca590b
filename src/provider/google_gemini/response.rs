use crate::error::ProviderError;

use super::types::GeminiGenerateContentResponse;

/// Concatenates the text parts of the first candidate.
///
/// Thought parts are skipped. A blocked prompt or a candidate without any text is an
/// error: the caller has nothing to render.
pub(crate) fn extract_text(
    resp: &GeminiGenerateContentResponse,
    provider: &'static str,
) -> Result<String, ProviderError> {
    if let Some(reason) = resp
        .prompt_feedback
        .as_ref()
        .and_then(|feedback| feedback.block_reason.as_deref())
    {
        return Err(ProviderError::provider(
            provider,
            format!("prompt was blocked: {reason}"),
        ));
    }

    let Some(candidate) = resp.candidates.first() else {
        return Err(ProviderError::provider(
            provider,
            "Gemini response contained no candidates",
        ));
    };

    let text: String = candidate
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter(|part| part.thought != Some(true))
        .filter_map(|part| part.text.as_deref())
        .collect();

    if text.is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("UNKNOWN");
        return Err(ProviderError::provider(
            provider,
            format!("Gemini returned no text (finish reason {reason})"),
        ));
    }

    Ok(text)
}
