//! Google Gemini GenerateContent provider.

mod error;
mod provider;
mod request;
mod response;
mod types;

pub use provider::{DEFAULT_BASE_URL, DEFAULT_MODEL, GoogleGeminiProvider};
