use crate::error::ProviderError;
use crate::provider::ModelRequest;

use super::types::{GeminiContent, GeminiGenerateContentRequest};

/// Builds the GenerateContent request body.
///
/// The model travels in the path (`POST /v1beta/models/{model}:generateContent`), so
/// the body only holds the system instruction and one user content.
pub(crate) fn build_gemini_body(
    request: &ModelRequest,
) -> Result<GeminiGenerateContentRequest, ProviderError> {
    if request.prompt.trim().is_empty() {
        return Err(ProviderError::Validation {
            status: None,
            message: "Gemini GenerateContent request requires a non-empty prompt".to_string(),
        });
    }

    Ok(GeminiGenerateContentRequest {
        system_instruction: GeminiContent::text(None, request.system_instruction.clone()),
        contents: vec![GeminiContent::text(Some("user"), request.prompt.clone())],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_carries_system_instruction_and_user_prompt() {
        let request = ModelRequest {
            system_instruction: "Return raw HTML.".to_string(),
            prompt: "a pricing table".to_string(),
        };
        let body = build_gemini_body(&request).expect("body");
        let value = serde_json::to_value(&body).expect("serialize");

        assert_eq!(
            value,
            json!({
                "system_instruction": { "parts": [ { "text": "Return raw HTML." } ] },
                "contents": [
                    { "role": "user", "parts": [ { "text": "a pricing table" } ] }
                ]
            })
        );
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let request = ModelRequest {
            system_instruction: "x".to_string(),
            prompt: "  ".to_string(),
        };
        assert!(matches!(
            build_gemini_body(&request),
            Err(ProviderError::Validation { .. })
        ));
    }
}
