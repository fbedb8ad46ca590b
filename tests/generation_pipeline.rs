use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use selfui::backoff::{RetryPolicy, Sleeper};
use selfui::error::{ErrorCategory, ProviderError};
use selfui::factory::{ClientFactory, GeminiClientBuilder};
use selfui::handler::{GenerationHandler, GenerationRequest, SYSTEM_INSTRUCTION};
use selfui::http::{HttpRequest, HttpResponse, HttpTransport};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Replays scripted responses in order and keeps every request it saw.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<(u16, String)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }

    fn header(&self, index: usize, name: &str) -> Option<String> {
        self.requests.lock().expect("lock")[index].headers.get(name).cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        self.requests.lock().expect("lock").push(request);
        let (status, body) = self
            .responses
            .lock()
            .expect("lock")
            .pop_front()
            .ok_or_else(|| ProviderError::transport("script exhausted"))?;
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into_bytes(),
        })
    }
}

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("lock").push(duration);
    }
}

fn ok_body(text: &str) -> (u16, String) {
    let body = json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    });
    (200, body.to_string())
}

fn error_body(code: u16, message: &str, status: &str) -> (u16, String) {
    let body = json!({ "error": { "code": code, "message": message, "status": status } });
    (code, body.to_string())
}

fn rate_limited() -> (u16, String) {
    error_body(429, "Resource has been exhausted", "RESOURCE_EXHAUSTED")
}

fn handler(
    transport: Arc<ScriptedTransport>,
    default_key: Option<&str>,
) -> (GenerationHandler, Arc<RecordingSleeper>) {
    let builder = GeminiClientBuilder::new(transport);
    let factory = ClientFactory::new(Arc::new(builder), default_key.map(str::to_string));
    let sleeper = Arc::new(RecordingSleeper::default());
    let handler = GenerationHandler::new(Arc::new(factory))
        .with_policy(RetryPolicy::default())
        .with_sleeper(sleeper.clone());
    (handler, sleeper)
}

fn delays_ms(sleeper: &RecordingSleeper) -> Vec<u128> {
    sleeper
        .delays
        .lock()
        .expect("lock")
        .iter()
        .map(Duration::as_millis)
        .collect()
}

#[tokio::test]
async fn blank_prompt_is_rejected_without_network() {
    let transport = ScriptedTransport::new(vec![ok_body("<div/>")]);
    let (handler, _) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("   "), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::InvalidRequest);
    assert_eq!(err.message, "Prompt is required");
    assert_eq!(err.http_status(), 400);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn missing_credentials_fail_without_network() {
    let transport = ScriptedTransport::new(vec![ok_body("<div/>")]);
    let (handler, _) = handler(transport.clone(), None);

    let request = GenerationRequest::new("a login form").with_override_credential("undefined");
    let err = handler
        .handle(&request, &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::MissingCredential);
    assert_eq!(err.message, "Invalid or missing API Key.");
    assert_eq!(err.http_status(), 500);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn succeeds_on_first_attempt_and_sends_instruction() {
    let transport = ScriptedTransport::new(vec![ok_body("<div class=\"p-4\">Hi</div>")]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let result = handler
        .handle(
            &GenerationRequest::new("a greeting card"),
            &CancellationToken::new(),
        )
        .await
        .expect("generate");

    assert_eq!(result.markup, "<div class=\"p-4\">Hi</div>");
    assert_eq!(transport.calls(), 1);
    assert!(delays_ms(&sleeper).is_empty());
    assert_eq!(
        transport.header(0, "x-goog-api-key").as_deref(),
        Some("server-key")
    );

    let requests = transport.requests.lock().expect("lock");
    assert!(requests[0].url.ends_with("/v1beta/models/gemini-flash-latest:generateContent"));
    let body: Value = serde_json::from_slice(requests[0].body.as_deref().expect("body")).expect("json");
    assert_eq!(
        body["system_instruction"]["parts"][0]["text"],
        SYSTEM_INSTRUCTION
    );
    assert_eq!(body["contents"][0]["parts"][0]["text"], "a greeting card");
}

#[tokio::test]
async fn retries_rate_limits_with_doubling_delay() {
    let transport =
        ScriptedTransport::new(vec![rate_limited(), rate_limited(), ok_body("<span>ok</span>")]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let result = handler
        .handle(&GenerationRequest::new("pricing table"), &CancellationToken::new())
        .await
        .expect("generate");

    assert_eq!(result.markup, "<span>ok</span>");
    assert_eq!(transport.calls(), 3);
    assert_eq!(delays_ms(&sleeper), vec![2000, 4000]);
}

#[tokio::test]
async fn gives_up_after_three_rate_limited_attempts() {
    let transport = ScriptedTransport::new(vec![rate_limited(), rate_limited(), rate_limited()]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("navbar"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::RateLimited);
    assert_eq!(err.message, "Rate limit exceeded. Please wait a moment.");
    assert_eq!(err.raw_status, Some(429));
    assert!(err.details.contains("Resource has been exhausted"));
    assert_eq!(transport.calls(), 3);
    assert_eq!(delays_ms(&sleeper), vec![2000, 4000]);
}

#[tokio::test]
async fn overload_is_retried_then_reported() {
    let overloaded = || error_body(503, "The model is overloaded.", "UNAVAILABLE");
    let transport = ScriptedTransport::new(vec![overloaded(), overloaded(), overloaded()]);
    let (handler, _) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("footer"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::ServiceUnavailable);
    assert_eq!(err.message, "Service overloaded. Please try again.");
    assert_eq!(err.http_status(), 503);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn other_failures_are_not_retried() {
    let transport = ScriptedTransport::new(vec![error_body(
        500,
        "Internal error encountered.",
        "INTERNAL",
    )]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("sidebar"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::Unknown);
    assert_eq!(err.message, "Failed to generate UI.");
    assert_eq!(err.raw_status, Some(500));
    assert_eq!(transport.calls(), 1);
    assert!(delays_ms(&sleeper).is_empty());
}

#[tokio::test]
async fn rejected_key_is_reported_as_credential_problem() {
    let transport = ScriptedTransport::new(vec![error_body(
        400,
        "API key not valid. Please pass a valid API key.",
        "INVALID_ARGUMENT",
    )]);
    let (handler, _) = handler(transport.clone(), Some("bad-key"));

    let err = handler
        .handle(&GenerationRequest::new("hero"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::MissingCredential);
    assert_eq!(err.message, "Invalid or missing API Key.");
    assert_eq!(err.http_status(), 400);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn override_key_replaces_default_for_one_request() {
    let transport = ScriptedTransport::new(vec![ok_body("<a/>"), ok_body("<b/>")]);
    let (handler, _) = handler(transport.clone(), Some("server-key"));
    let cancel = CancellationToken::new();

    handler
        .handle(
            &GenerationRequest::new("x").with_override_credential("user-key"),
            &cancel,
        )
        .await
        .expect("generate");
    handler
        .handle(&GenerationRequest::new("y"), &cancel)
        .await
        .expect("generate");

    assert_eq!(transport.header(0, "x-goog-api-key").as_deref(), Some("user-key"));
    assert_eq!(transport.header(1, "x-goog-api-key").as_deref(), Some("server-key"));
}

#[tokio::test]
async fn fenced_output_is_sanitized() {
    let transport = ScriptedTransport::new(vec![ok_body(
        "```html\n<div class=\"grid\">\n  <p>cell</p>\n</div>\n```",
    )]);
    let (handler, _) = handler(transport, Some("server-key"));

    let result = handler
        .handle(&GenerationRequest::new("grid"), &CancellationToken::new())
        .await
        .expect("generate");

    assert_eq!(result.markup, "<div class=\"grid\">\n  <p>cell</p>\n</div>");
}

#[tokio::test]
async fn cancelled_request_makes_no_attempt() {
    let transport = ScriptedTransport::new(vec![ok_body("<div/>")]);
    let (handler, _) = handler(transport.clone(), Some("server-key"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = handler
        .handle(&GenerationRequest::new("card"), &cancel)
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::Unknown);
    assert_eq!(err.message, "Request cancelled.");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn bad_request_returns_immediately() {
    let transport = ScriptedTransport::new(vec![
        error_body(400, "Invalid value at 'contents'", "INVALID_ARGUMENT"),
        ok_body("<div/>"),
    ]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("modal"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::Unknown);
    assert_eq!(err.message, "Failed to generate UI.");
    assert_eq!(err.raw_status, Some(400));
    assert!(err.details.contains("Invalid value at 'contents'"));
    assert_eq!(transport.calls(), 1);
    assert!(delays_ms(&sleeper).is_empty());
}

#[tokio::test]
async fn disabled_api_is_not_reported_as_bad_key() {
    let transport = ScriptedTransport::new(vec![error_body(
        403,
        "Generative Language API has not been used in project 123 before or it is disabled.",
        "PERMISSION_DENIED",
    )]);
    let (handler, sleeper) = handler(transport.clone(), Some("server-key"));

    let err = handler
        .handle(&GenerationRequest::new("dashboard"), &CancellationToken::new())
        .await
        .expect_err("should fail");

    assert_eq!(err.category, ErrorCategory::Unknown);
    assert_eq!(err.message, "Failed to generate UI.");
    assert!(err.details.contains("has not been used in project 123"));
    assert_eq!(err.http_status(), 403);
    assert_eq!(transport.calls(), 1);
    assert!(delays_ms(&sleeper).is_empty());
}
