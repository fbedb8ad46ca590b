//! Inbound HTTP boundary: `POST /api/generate`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GenerationError, PROMPT_REQUIRED};
use crate::handler::{GenerationHandler, GenerationRequest};

/// Header carrying the caller-supplied provider key.
pub const OVERRIDE_HEADER: &str = "x-custom-api-key";

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub handler: GenerationHandler,
    /// Cancelled on shutdown; each request runs on a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(handler: GenerationHandler) -> Self {
        Self {
            handler,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Inbound payload.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Success payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateReply {
    pub code: String,
}

/// Failure payload. `details` is omitted for rejected input.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

/// Serves `router` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn generate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let prompt = serde_json::from_slice::<GenerateBody>(&body)
        .ok()
        .and_then(|body| body.prompt)
        .filter(|prompt| !prompt.trim().is_empty());
    let Some(prompt) = prompt else {
        debug!("rejecting request without prompt");
        return rejected();
    };

    let mut request = GenerationRequest::new(prompt);
    if let Some(value) = headers
        .get(OVERRIDE_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        request = request.with_override_credential(value);
    }

    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();
    match state.handler.handle(&request, &cancel).await {
        Ok(result) => (
            StatusCode::OK,
            Json(GenerateReply {
                code: result.markup,
            }),
        )
            .into_response(),
        Err(err) => failure(err),
    }
}

fn rejected() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorReply {
            error: PROMPT_REQUIRED.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn failure(err: GenerationError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorReply {
            error: err.message,
            details: Some(err.details),
        }),
    )
        .into_response()
}
