use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProviderError;

const PROVIDER: &str = "google_gemini";

/// Parses error responses returned by Google Gemini.
///
/// The HTTP status drives the classification; the RPC status text is appended to the
/// message so diagnostics keep both.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }

    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        status: Option<String>,
        #[allow(dead_code)]
        details: Option<Value>,
    }

    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(error) }) => {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            if let Some(status_text) = error.status.as_deref() {
                if !status_text.is_empty() {
                    message = format!("{message} ({status_text})");
                }
            }
            message
        }
        // Fallback: if the payload cannot be parsed, keep the raw body.
        _ => format!("status {status}: {body}"),
    };

    match status {
        401 | 403 => ProviderError::Auth {
            status: Some(status),
            message,
        },
        429 => ProviderError::RateLimit {
            message,
            retry_after,
        },
        503 => ProviderError::Unavailable { message },
        400 => ProviderError::Validation {
            status: Some(status),
            message,
        },
        _ => ProviderError::Provider {
            provider: PROVIDER,
            status: Some(status),
            message,
        },
    }
}
