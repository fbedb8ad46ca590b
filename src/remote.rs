use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::http::{DynHttpTransport, HttpRequest, HttpResponse, post_json_with_headers};
use crate::server::{ErrorReply, GenerateReply, OVERRIDE_HEADER};
use crate::session::{GenerateBackend, GenerateFailure};

/// Fallback text when a failed reply carries no usable message.
const GENERATION_FAILED: &str = "Generation failed";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Calls a remote `POST /api/generate` endpoint.
pub struct RemoteGenerator {
    transport: DynHttpTransport,
    base_url: String,
}

impl RemoteGenerator {
    /// `base_url` is the server origin, e.g. `http://127.0.0.1:3000`.
    pub fn new(transport: DynHttpTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    /// Checks that the server answers `GET /healthz`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] when the server is unreachable and
    /// [`ProviderError::Provider`] carrying the status for a non-2xx answer.
    pub async fn health(&self) -> Result<(), ProviderError> {
        let url = format!("{}/healthz", self.base_url.trim_end_matches('/'));
        let response = self
            .transport
            .send(HttpRequest::get(url).with_timeout(Some(HEALTH_TIMEOUT)))
            .await?;
        if response.is_success() {
            return Ok(());
        }
        let status = response.status;
        Err(ProviderError::Provider {
            provider: "selfui",
            status: Some(status),
            message: response.into_string().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl GenerateBackend for RemoteGenerator {
    async fn generate(
        &self,
        prompt: &str,
        override_credential: Option<&str>,
    ) -> Result<String, GenerateFailure> {
        let mut headers = HashMap::new();
        if let Some(key) = override_credential {
            headers.insert(OVERRIDE_HEADER.to_string(), key.to_string());
        }

        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            headers,
            &json!({ "prompt": prompt }),
            None,
        )
        .await
        .map_err(|err| GenerateFailure {
            message: err.to_string(),
            details: None,
            status: None,
        })?;

        decode_reply(response)
    }
}

fn decode_reply(response: HttpResponse) -> Result<String, GenerateFailure> {
    let status = response.status;
    if response.is_success() {
        return serde_json::from_slice::<GenerateReply>(&response.body)
            .map(|reply| reply.code)
            .map_err(|err| GenerateFailure {
                message: GENERATION_FAILED.to_string(),
                details: Some(format!("malformed reply: {err}")),
                status: Some(status),
            });
    }

    debug!(status, "generate endpoint returned an error");
    let reply = serde_json::from_slice::<ErrorReply>(&response.body).ok();
    let (error, details) = match reply {
        Some(ErrorReply { error, details }) => (Some(error), details),
        None => (None, None),
    };
    let message = error
        .clone()
        .filter(|text| !text.is_empty())
        .or_else(|| details.clone().filter(|text| !text.is_empty()))
        .unwrap_or_else(|| GENERATION_FAILED.to_string());
    Err(GenerateFailure {
        message,
        details,
        status: Some(status),
    })
}
