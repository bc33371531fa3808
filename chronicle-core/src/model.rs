//! The narrative model seam.
//!
//! The engine only needs "messages in, text out". Provider clients are
//! adapted to [`NarrativeModel`] in [`crate::providers`]; tests use
//! [`crate::testing::ScriptedModel`].

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from model invocation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model provider error: {0}")]
    Provider(#[from] llm::Error),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model returned an empty reply")]
    EmptyReply,

    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Who is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling options for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

impl ModelOptions {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A model's text reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
}

/// Anything that can turn a conversation into narration.
#[async_trait]
pub trait NarrativeModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &ModelOptions,
    ) -> Result<ModelReply, ModelError>;

    /// Name for logs.
    fn name(&self) -> &str {
        "model"
    }
}

/// Invoke `model`, failing with [`ModelError::Timeout`] if it takes longer
/// than `timeout`.
pub async fn invoke_with_timeout(
    model: &dyn NarrativeModel,
    messages: &[ChatMessage],
    options: &ModelOptions,
    timeout: Duration,
) -> Result<ModelReply, ModelError> {
    match tokio::time::timeout(timeout, model.invoke(messages, options)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout(timeout)),
    }
}
