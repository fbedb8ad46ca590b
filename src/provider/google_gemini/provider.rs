use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::http::{DynHttpTransport, HttpResponse, post_json_with_headers};
use crate::provider::{ModelProvider, ModelRequest, retry::retry_after_from_headers};

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::extract_text;
use super::types::GeminiGenerateContentResponse;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

/// Google Gemini GenerateContent provider bound to one API key.
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) timeout: Option<Duration>,
}

impl GoogleGeminiProvider {
    /// Creates a provider that targets the default Google Generative Language endpoint.
    ///
    /// No network I/O happens here.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            timeout: None,
        }
    }

    /// Overrides the base URL, making it easier to point at proxies or test servers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model, such as `gemini-2.5-flash`.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bounds each call; `None` leaves the transport default.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the endpoint URL for GenerateContent.
    pub(crate) fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let model_path = normalize_model(&self.model);
        if base.ends_with("/v1beta") {
            format!("{base}/{model_path}:generateContent")
        } else {
            format!("{base}/v1beta/{model_path}:generateContent")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers
    }

    fn ensure_success(&self, response: HttpResponse) -> Result<String, ProviderError> {
        let status = response.status;
        let success = response.is_success();
        let retry_after = retry_after_from_headers(&response.headers);
        let text = response.into_string()?;
        if success {
            Ok(text)
        } else {
            Err(parse_gemini_error(status, &text, retry_after))
        }
    }

    fn try_parse<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProviderError> {
        serde_json::from_str(text).map_err(|err| {
            ProviderError::provider(self.name(), format!("failed to parse Gemini response: {err}"))
        })
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl ModelProvider for GoogleGeminiProvider {
    async fn generate(&self, request: &ModelRequest) -> Result<String, ProviderError> {
        let body = build_gemini_body(request)?;
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint(),
            self.build_headers(),
            &body,
            self.timeout,
        )
        .await?;
        let text = self.ensure_success(response)?;
        let parsed: GeminiGenerateContentResponse = self.try_parse(&text)?;
        extract_text(&parsed, self.name())
    }

    fn name(&self) -> &'static str {
        "google_gemini"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::http::{HttpRequest, HttpTransport};

    /// Records the last request and answers with a canned response.
    struct CannedTransport {
        status: u16,
        body: &'static str,
        seen: Mutex<Option<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
            *self.seen.lock().expect("lock") = Some(request);
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::from([("retry-after".to_string(), "3".to_string())]),
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            system_instruction: "Return raw HTML.".to_string(),
            prompt: "a login form".to_string(),
        }
    }

    #[test]
    fn endpoint_handles_versioned_base_and_model_prefix() {
        let transport = Arc::new(CannedTransport {
            status: 200,
            body: "{}",
            seen: Mutex::new(None),
        });
        let provider = GoogleGeminiProvider::new(transport.clone(), "k");
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-flash-latest:generateContent"
        );

        let provider = GoogleGeminiProvider::new(transport, "k")
            .with_base_url("http://localhost:8080/v1beta/")
            .with_model("models/gemini-2.5-pro");
        assert_eq!(
            provider.endpoint(),
            "http://localhost:8080/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[tokio::test]
    async fn generate_sends_key_header_and_returns_text() {
        let transport = Arc::new(CannedTransport {
            status: 200,
            body: r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"<form></form>"}]}}]}"#,
            seen: Mutex::new(None),
        });
        let provider = GoogleGeminiProvider::new(transport.clone(), "secret-key");

        let text = provider.generate(&request()).await.expect("generate");
        assert_eq!(text, "<form></form>");

        let seen = transport.seen.lock().expect("lock").clone().expect("request");
        assert_eq!(
            seen.headers.get("x-goog-api-key").map(String::as_str),
            Some("secret-key")
        );
        let body: serde_json::Value =
            serde_json::from_slice(seen.body.as_deref().expect("body")).expect("json");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "a login form");
    }

    #[tokio::test]
    async fn generate_maps_rate_limit_with_retry_after() {
        let transport = Arc::new(CannedTransport {
            status: 429,
            body: r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#,
            seen: Mutex::new(None),
        });
        let provider = GoogleGeminiProvider::new(transport, "k");

        match provider.generate(&request()).await {
            Err(ProviderError::RateLimit { retry_after, .. }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_success_body_is_provider_error() {
        let transport = Arc::new(CannedTransport {
            status: 200,
            body: "<html>proxy page</html>",
            seen: Mutex::new(None),
        });
        let provider = GoogleGeminiProvider::new(transport, "k");

        match provider.generate(&request()).await {
            Err(ProviderError::Provider { message, .. }) => {
                assert!(message.contains("failed to parse Gemini response"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
