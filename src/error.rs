use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Classified failure of a single model provider call.
///
/// Every variant that originates from an HTTP response keeps the status code so the
/// retry controller can decide whether another attempt is worthwhile.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Represents transport-layer or networking failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Reports invalid or missing credentials.
    #[error("auth failure: {message}")]
    Auth { status: Option<u16>, message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider before retrying.
        retry_after: Option<Duration>,
    },
    /// The provider is overloaded or temporarily down (HTTP 503).
    #[error("service unavailable: {message}")]
    Unavailable { message: String },
    /// Signals validation failures in the request payload.
    #[error("invalid request: {message}")]
    Validation { status: Option<u16>, message: String },
    /// Wraps provider-defined errors that cannot be normalized.
    #[error("provider {provider} error: {message}")]
    Provider {
        /// Name of the provider, such as `google_gemini`.
        provider: &'static str,
        /// HTTP status of the failed response, if there was one.
        status: Option<u16>,
        /// Human-readable error message returned by the provider.
        message: String,
    },
    /// Surfaces cancellations triggered by the caller.
    #[error("request aborted: {message}")]
    Aborted { message: String },
    /// Catches opaque or unexpected failures.
    #[error("unknown error: {message}")]
    Unknown { message: String },
}

impl ProviderError {
    /// Creates a [`ProviderError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use selfui::error::ProviderError;
    ///
    /// let err = ProviderError::transport("dns lookup failed");
    /// assert!(matches!(err, ProviderError::Transport { .. }));
    /// assert_eq!(err.status(), None);
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a [`ProviderError::Provider`] for a failure without an HTTP status.
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            status: None,
            message: message.into(),
        }
    }

    /// HTTP-style status code attached to the failure.
    ///
    /// Rate limiting and overload are always reported as 429 and 503, whatever shape
    /// the upstream payload had.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimit { .. } => Some(429),
            Self::Unavailable { .. } => Some(503),
            Self::Auth { status, .. }
            | Self::Validation { status, .. }
            | Self::Provider { status, .. } => *status,
            Self::Transport { .. } | Self::Aborted { .. } | Self::Unknown { .. } => None,
        }
    }

    /// The underlying message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message }
            | Self::Auth { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Unavailable { message }
            | Self::Validation { message, .. }
            | Self::Provider { message, .. }
            | Self::Aborted { message }
            | Self::Unknown { message } => message,
        }
    }
}

/// Category of a failed generation, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingCredential,
    RateLimited,
    ServiceUnavailable,
    InvalidRequest,
    Unknown,
}

/// Terminal outcome of a generation that did not produce markup.
///
/// `message` is the short text that drives UI state; `details` keeps the raw
/// diagnostic detail from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({details})")]
pub struct GenerationError {
    pub category: ErrorCategory,
    pub message: String,
    pub details: String,
    pub raw_status: Option<u16>,
}

pub(crate) const PROMPT_REQUIRED: &str = "Prompt is required";
pub(crate) const MISSING_CREDENTIAL: &str = "Invalid or missing API Key.";
pub(crate) const RATE_LIMITED: &str = "Rate limit exceeded. Please wait a moment.";
pub(crate) const SERVICE_OVERLOADED: &str = "Service overloaded. Please try again.";
pub(crate) const GENERATION_FAILED: &str = "Failed to generate UI.";
pub(crate) const REQUEST_CANCELLED: &str = "Request cancelled.";

impl GenerationError {
    /// Rejects a request before any provider work happens.
    pub fn invalid_request() -> Self {
        Self {
            category: ErrorCategory::InvalidRequest,
            message: PROMPT_REQUIRED.to_string(),
            details: PROMPT_REQUIRED.to_string(),
            raw_status: Some(400),
        }
    }

    /// Neither an override nor a default credential is configured.
    pub fn missing_credential() -> Self {
        Self {
            category: ErrorCategory::MissingCredential,
            message: MISSING_CREDENTIAL.to_string(),
            details: "API key is missing. Set GEMINI_API_KEY or send x-custom-api-key".to_string(),
            raw_status: None,
        }
    }

    /// Terminal failure with no captured provider error.
    pub fn no_result() -> Self {
        Self {
            category: ErrorCategory::Unknown,
            message: GENERATION_FAILED.to_string(),
            details: "no result produced".to_string(),
            raw_status: None,
        }
    }

    /// Classifies a terminal provider failure.
    ///
    /// Credential problems are recognised first, from the message text only: a 401/403
    /// without a key marker (a disabled API, a blocked project) stays
    /// [`ErrorCategory::Unknown`]. Then the status decides between rate limiting and
    /// overload; everything else is reported verbatim as [`ErrorCategory::Unknown`].
    pub fn from_provider(err: &ProviderError) -> Self {
        let status = err.status();
        let details = err.message().to_string();
        let (category, message) = if looks_like_credential_error(&details) {
            (ErrorCategory::MissingCredential, MISSING_CREDENTIAL)
        } else if status == Some(503) {
            (ErrorCategory::ServiceUnavailable, SERVICE_OVERLOADED)
        } else if status == Some(429) {
            (ErrorCategory::RateLimited, RATE_LIMITED)
        } else if matches!(err, ProviderError::Aborted { .. }) {
            (ErrorCategory::Unknown, REQUEST_CANCELLED)
        } else {
            (ErrorCategory::Unknown, GENERATION_FAILED)
        };
        Self {
            category,
            message: message.to_string(),
            details,
            raw_status: status,
        }
    }

    /// HTTP status to answer the inbound request with.
    pub fn http_status(&self) -> u16 {
        match self.category {
            ErrorCategory::InvalidRequest => 400,
            _ => self.raw_status.unwrap_or(500),
        }
    }
}

/// Returns `true` when a provider message points at a bad or absent API key.
pub(crate) fn looks_like_credential_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    const HINTS: [&str; 3] = ["api key", "api_key", "unauthenticated"];
    HINTS.iter().any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_and_overload() {
        let err = GenerationError::from_provider(&ProviderError::RateLimit {
            message: "quota exhausted".to_string(),
            retry_after: None,
        });
        assert_eq!(err.category, ErrorCategory::RateLimited);
        assert_eq!(err.raw_status, Some(429));
        assert_eq!(err.http_status(), 429);
        assert_eq!(err.details, "quota exhausted");

        let err = GenerationError::from_provider(&ProviderError::Unavailable {
            message: "The model is overloaded".to_string(),
        });
        assert_eq!(err.category, ErrorCategory::ServiceUnavailable);
        assert_eq!(err.message, SERVICE_OVERLOADED);
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn credential_marker_wins_over_status() {
        let err = GenerationError::from_provider(&ProviderError::Validation {
            status: Some(400),
            message: "API key not valid. Please pass a valid API key.".to_string(),
        });
        assert_eq!(err.category, ErrorCategory::MissingCredential);
        assert_eq!(err.message, MISSING_CREDENTIAL);
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn forbidden_without_key_marker_is_unknown() {
        let message = "Generative Language API has not been used in project 123 before or it \
                       is disabled. (PERMISSION_DENIED)";
        let err = GenerationError::from_provider(&ProviderError::Auth {
            status: Some(403),
            message: message.to_string(),
        });
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.message, GENERATION_FAILED);
        assert_eq!(err.details, message);
        assert_eq!(err.http_status(), 403);
    }

    #[test]
    fn unauthenticated_status_text_counts_as_key_marker() {
        let err = GenerationError::from_provider(&ProviderError::Auth {
            status: Some(401),
            message: "Request had invalid authentication credentials. (UNAUTHENTICATED)"
                .to_string(),
        });
        assert_eq!(err.category, ErrorCategory::MissingCredential);
        assert_eq!(err.http_status(), 401);
    }

    #[test]
    fn unknown_failures_keep_message_verbatim() {
        let err = GenerationError::from_provider(&ProviderError::transport("connection reset"));
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.message, GENERATION_FAILED);
        assert_eq!(err.details, "connection reset");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn aborted_requests_are_unknown_with_cancel_message() {
        let err = GenerationError::from_provider(&ProviderError::Aborted {
            message: "caller went away".to_string(),
        });
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.message, REQUEST_CANCELLED);
    }

    #[test]
    fn no_result_reports_unknown() {
        let err = GenerationError::no_result();
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert_eq!(err.details, "no result produced");
    }
}
