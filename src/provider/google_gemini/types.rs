use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GenerateContent request body.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct GeminiGenerateContentRequest {
    pub(crate) system_instruction: GeminiContent,
    pub(crate) contents: Vec<GeminiContent>,
}

/// Top level of a GenerateContentResponse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    /// Candidate answers.
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    /// Content-filter feedback about the prompt.
    #[serde(default, rename = "promptFeedback")]
    pub(crate) prompt_feedback: Option<GeminiPromptFeedback>,
    /// Model version that actually answered.
    #[serde(default, rename = "modelVersion")]
    pub(crate) model_version: Option<String>,
    /// Unmapped fields.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// One candidate answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
    /// Remaining fields such as safetyRatings or citationMetadata.
    #[serde(flatten)]
    pub(crate) extra: HashMap<String, Value>,
}

/// Content block, shared by requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
}

/// One content part; only text matters here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) text: Option<String>,
    /// Marks a Gemini 2.5 thought summary, which is not part of the output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) thought: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct GeminiPromptFeedback {
    #[serde(default, rename = "blockReason")]
    pub(crate) block_reason: Option<String>,
}

impl GeminiContent {
    pub(crate) fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: Some(text.into()),
                thought: None,
            }],
        }
    }
}
