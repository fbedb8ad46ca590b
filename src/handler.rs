use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::backoff::{RetryPolicy, Sleeper, TokioSleeper, run_with_retry};
use crate::error::GenerationError;
use crate::factory::ClientFactory;
use crate::provider::ModelRequest;
use crate::sanitize::sanitize_markup;

/// Fixed instruction sent with every generation. Not user-configurable.
pub const SYSTEM_INSTRUCTION: &str = "You are an expert frontend developer.
Goal: Generate production-ready HTML/Tailwind CSS based on the user's request.
Strict Rules:
1. Return ONLY the raw HTML string.
2. Do NOT use markdown code blocks.
3. Use Tailwind CSS for all styling.
4. Use inline SVGs (Lucide style) for icons.
5. NO <html>, <head>, or <body> tags.
6. Ensure responsive design (mobile-first).
7. Default to a clean, modern, professional aesthetic.";

/// One user submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub override_credential: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            override_credential: None,
        }
    }

    pub fn with_override_credential(mut self, credential: impl Into<String>) -> Self {
        self.override_credential = Some(credential.into());
        self
    }
}

/// Sanitized markup ready for the preview pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub markup: String,
}

/// Turns prompts into sanitized markup. Stateless between calls and the only place
/// that retries.
#[derive(Clone)]
pub struct GenerationHandler {
    factory: Arc<ClientFactory>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl GenerationHandler {
    pub fn new(factory: Arc<ClientFactory>) -> Self {
        Self {
            factory,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Runs one generation end to end.
    ///
    /// # Errors
    ///
    /// Every failure is classified into a [`GenerationError`]; provider errors never
    /// escape unclassified.
    #[instrument(skip_all, fields(prompt_len = request.prompt.len()))]
    pub async fn handle(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::invalid_request());
        }

        let client = self
            .factory
            .client(request.override_credential.as_deref())?;

        let model_request = ModelRequest {
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            prompt: request.prompt.clone(),
        };

        let raw = run_with_retry(&self.policy, self.sleeper.as_ref(), cancel, |_| {
            client.generate(&model_request)
        })
        .await
        .map_err(|failure| {
            let err = match &failure.last_error {
                Some(last) => GenerationError::from_provider(last),
                None => GenerationError::no_result(),
            };
            error!(
                provider = client.name(),
                attempts = failure.attempts,
                category = ?err.category,
                status = err.raw_status,
                details = %err.details,
                "generation failed"
            );
            err
        })?;

        let markup = sanitize_markup(&raw);
        info!(
            provider = client.name(),
            markup_len = markup.len(),
            "generation succeeded"
        );
        Ok(GenerationResult { markup })
    }
}
