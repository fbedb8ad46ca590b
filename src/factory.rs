use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::debug;

use crate::config::AppConfig;
use crate::error::GenerationError;
use crate::http::DynHttpTransport;
use crate::provider::DynProvider;
use crate::provider::google_gemini::GoogleGeminiProvider;

/// Literal header values that browsers send for an unset key.
pub const SENTINEL_CREDENTIALS: [&str; 2] = ["null", "undefined"];

/// Returns the override key if it is usable, `None` for absent, blank or sentinel values.
///
/// ```
/// use selfui::factory::usable_override;
///
/// assert_eq!(usable_override(Some(" key-1 ")), Some("key-1"));
/// assert_eq!(usable_override(Some("undefined")), None);
/// assert_eq!(usable_override(Some("")), None);
/// assert_eq!(usable_override(None), None);
/// ```
pub fn usable_override(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim)
        .filter(|key| !key.is_empty() && !SENTINEL_CREDENTIALS.contains(key))
}

/// Constructs a model client bound to one API key. Must not perform network I/O.
pub trait ClientBuilder: Send + Sync {
    fn build(&self, api_key: &str) -> DynProvider;
}

/// Builds [`GoogleGeminiProvider`] clients sharing one transport.
pub struct GeminiClientBuilder {
    transport: DynHttpTransport,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Option<Duration>,
}

impl GeminiClientBuilder {
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            base_url: None,
            model: None,
            timeout: None,
        }
    }

    /// Copies endpoint, model and timeout from the service configuration.
    pub fn from_config(config: &AppConfig, transport: DynHttpTransport) -> Self {
        Self {
            transport,
            base_url: Some(config.base_url.clone()),
            model: Some(config.model.clone()),
            timeout: config.request_timeout(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl ClientBuilder for GeminiClientBuilder {
    fn build(&self, api_key: &str) -> DynProvider {
        let mut provider = GoogleGeminiProvider::new(self.transport.clone(), api_key)
            .with_timeout(self.timeout);
        if let Some(base_url) = &self.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        if let Some(model) = &self.model {
            provider = provider.with_model(model.clone());
        }
        Arc::new(provider)
    }
}

/// Hands out model clients for generation requests.
///
/// The default client is created on first use from the configured key and never
/// replaced. Override clients are built per call and dropped with it.
pub struct ClientFactory {
    builder: Arc<dyn ClientBuilder>,
    default_key: Option<String>,
    default_client: OnceLock<DynProvider>,
}

impl ClientFactory {
    pub fn new(builder: Arc<dyn ClientBuilder>, default_key: Option<String>) -> Self {
        let default_key = default_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        Self {
            builder,
            default_key,
            default_client: OnceLock::new(),
        }
    }

    /// Whether a default credential was configured.
    pub fn has_default(&self) -> bool {
        self.default_key.is_some()
    }

    /// Selects the client for one request.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::error::ErrorCategory::MissingCredential`] error when neither
    /// a usable override nor a default key exists. Nothing touches the network.
    pub fn client(&self, override_credential: Option<&str>) -> Result<DynProvider, GenerationError> {
        if let Some(key) = usable_override(override_credential) {
            debug!("using per-request credential override");
            return Ok(self.builder.build(key));
        }

        let Some(key) = &self.default_key else {
            return Err(GenerationError::missing_credential());
        };
        let client = self.default_client.get_or_init(|| {
            debug!("initializing default model client");
            self.builder.build(key)
        });
        Ok(client.clone())
    }
}
