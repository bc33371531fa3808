//! Adapters from the `llm` provider clients to the engine's seams.

use crate::canon::{CanonError, CanonSearch, CanonSnippet};
use crate::memory::{Embedder, MemoryError};
use crate::model::{ChatMessage, ChatRole, ModelError, ModelOptions, ModelReply, NarrativeModel};
use async_trait::async_trait;
use llm::{Claude, ExaSearch, Message, OpenAiEmbeddings, Request};

/// Default completion budget when the caller does not set one.
const DEFAULT_MAX_TOKENS: usize = 2048;

/// Split chat messages into the Anthropic shape: system text goes into the
/// request's `system` field, everything else stays in order.
pub(crate) fn to_claude_request(messages: &[ChatMessage], options: &ModelOptions) -> Request {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            ChatRole::System => system.push(message.content.as_str()),
            ChatRole::User => turns.push(Message::user(message.content.clone())),
            ChatRole::Assistant => turns.push(Message::assistant(message.content.clone())),
        }
    }

    let mut request = Request::new(turns)
        .with_max_tokens(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
        .with_temperature(options.temperature);
    if !system.is_empty() {
        request = request.with_system(system.join("\n\n"));
    }
    request
}

#[async_trait]
impl NarrativeModel for Claude {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &ModelOptions,
    ) -> Result<ModelReply, ModelError> {
        let response = self.complete(to_claude_request(messages, options)).await?;
        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model reply received"
        );
        if response.text.trim().is_empty() {
            return Err(ModelError::EmptyReply);
        }
        Ok(ModelReply {
            content: response.text,
        })
    }

    fn name(&self) -> &str {
        self.model()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        Ok(OpenAiEmbeddings::embed(self, text).await?)
    }

    fn dimension(&self) -> usize {
        OpenAiEmbeddings::dimension(self)
    }
}

#[async_trait]
impl CanonSearch for ExaSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CanonSnippet>, CanonError> {
        let results = ExaSearch::search(self, query, limit)
            .await
            .map_err(|e| CanonError::Search(e.to_string()))?;
        Ok(results
            .into_iter()
            .map(|r| CanonSnippet {
                title: r.title,
                url: r.url,
                snippet: r.text,
            })
            .collect())
    }
}
