use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;

pub mod google_gemini;
pub(crate) mod retry;

/// Input of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    /// Fixed instruction describing the output contract.
    pub system_instruction: String,
    /// The user's description of the interface.
    pub prompt: String,
}

/// A model backend the generation pipeline can call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Issues exactly one model call and returns the raw generated text.
    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError>;

    /// Provider name used in logs and errors.
    fn name(&self) -> &'static str;
}

/// Shared provider handle.
pub type DynProvider = Arc<dyn ModelProvider>;
