use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::google_gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Primary and fallback environment variables for the default provider key.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "NEXT_PUBLIC_GEMINI_API_KEY"];

/// Failure while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Service configuration.
///
/// The retry schedule is not configured here: every request gets the fixed
/// [`crate::backoff::RetryPolicy::default`]. A missing API key is not an error here;
/// requests without an override key fail with a credential error at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default Gemini key shared by every request without an override.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub bind: SocketAddr,
    /// JSON file holding the generation history.
    pub history_path: PathBuf,
    /// JSON file holding the project list.
    pub projects_path: PathBuf,
    /// JSON file holding user settings such as a saved personal key.
    pub settings_path: PathBuf,
    /// Per-call provider timeout; `None` keeps the transport default.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            history_path: PathBuf::from("selfui_history.json"),
            projects_path: PathBuf::from("selfui_projects.json"),
            settings_path: PathBuf::from("selfui_settings.json"),
            request_timeout_secs: None,
        }
    }
}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Builds configuration from an explicit variable map. Empty values count as unset.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let mut config = Self {
            api_key: API_KEY_VARS.iter().find_map(|name| get(*name)),
            ..Self::default()
        };

        if let Some(model) = get("SELFUI_MODEL") {
            config.model = model;
        }
        if let Some(base_url) = get("SELFUI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(bind) = get("SELFUI_BIND") {
            config.bind = bind.parse().map_err(|err| ConfigError::Invalid {
                field: "SELFUI_BIND",
                reason: format!("{bind:?} is not a socket address: {err}"),
            })?;
        }
        if let Some(path) = get("SELFUI_HISTORY_PATH") {
            config.history_path = PathBuf::from(path);
        }
        if let Some(path) = get("SELFUI_PROJECTS_PATH") {
            config.projects_path = PathBuf::from(path);
        }
        if let Some(path) = get("SELFUI_SETTINGS_PATH") {
            config.settings_path = PathBuf::from(path);
        }
        if let Some(timeout) = get("SELFUI_TIMEOUT_SECS") {
            config.request_timeout_secs = Some(parse_number("SELFUI_TIMEOUT_SECS", &timeout)?);
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err| ConfigError::Invalid {
        field,
        reason: format!("{value:?}: {err}"),
    })
}
