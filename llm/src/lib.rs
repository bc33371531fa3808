//! Minimal clients for the two providers the narrator talks to.
//!
//! - [`Claude`]: non-streaming completions against the Anthropic Messages API
//! - [`OpenAiEmbeddings`]: text embeddings against an OpenAI-compatible endpoint
//! - [`ExaSearch`]: web search used for canon lookups
//!
//! All clients are cheap to clone and share one pooled HTTP client each.

mod anthropic;
mod exa;
mod openai;

pub use anthropic::{Claude, Message, Request, Response, Role, StopReason, Usage};
pub use exa::{ExaSearch, SearchResult};
pub use openai::OpenAiEmbeddings;

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a provider.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured ({0})")]
    NoApiKey(&'static str),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(e.to_string())
        }
    }
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Turn a non-2xx response into [`Error::Api`], passing successes through.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(Error::Api { status, message })
}
