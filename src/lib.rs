//! Prompt → Tailwind markup generation backed by Google Gemini.
//!
//! The core is [`handler::GenerationHandler`]: it picks a model client through
//! [`factory::ClientFactory`] (default key or a per-request override), retries
//! rate-limited and overloaded calls with exponential backoff ([`backoff`]) and
//! strips markdown fences from the result ([`sanitize`]). [`server`] exposes it as
//! `POST /api/generate`; [`session::GenerationSession`] is the caller side that
//! guards against double submission, keeps a history of successful results and a
//! list of named projects. [`store`] backs the file-based stores.

pub mod backoff;
pub mod config;
pub mod error;
pub mod factory;
pub mod handler;
pub mod history;
pub mod http;
pub mod project;
pub mod provider;
pub mod remote;
pub mod sanitize;
pub mod server;
pub mod session;
pub mod settings;
pub mod store;

pub use backoff::{RetryPolicy, Sleeper, TokioSleeper};
pub use config::AppConfig;
pub use error::{ErrorCategory, GenerationError, ProviderError};
pub use factory::{ClientBuilder, ClientFactory, GeminiClientBuilder};
pub use handler::{GenerationHandler, GenerationRequest, GenerationResult};
pub use history::{HistoryEntry, HistoryStore, JsonFileHistoryStore, MemoryHistoryStore};
pub use project::{JsonFileProjectStore, MemoryProjectStore, Project, ProjectStore};
pub use provider::{DynProvider, ModelProvider, ModelRequest};
pub use remote::RemoteGenerator;
pub use sanitize::sanitize_markup;
pub use session::{
    GenerateBackend, GenerationSession, LocalGenerator, SessionError, SessionEvent,
};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
pub use store::StoreError;
