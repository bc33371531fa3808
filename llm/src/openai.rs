//! OpenAI-compatible embeddings client.

use crate::{check_status, http_client, Error};
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;

/// Embeddings client for `/embeddings`.
#[derive(Clone)]
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
}

impl OpenAiEmbeddings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: API_BASE.to_string(),
            dimension: DEFAULT_DIMENSION,
        }
    }

    /// Create a client from `OPENAI_API_KEY`.
    ///
    /// `OPENAI_EMBEDDING_MODEL` and `OPENAI_BASE_URL` override the defaults.
    pub fn from_env() -> Result<Self, Error> {
        let api_key =
            std::env::var("OPENAI_API_KEY").map_err(|_| Error::NoApiKey("OPENAI_API_KEY"))?;
        let mut client = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_EMBEDDING_MODEL") {
            if !model.trim().is_empty() {
                client = client.with_model(model);
            }
        }
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            if !base.trim().is_empty() {
                client = client.with_base_url(base);
            }
        }
        Ok(client)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Expected vector length. Responses of any other length are rejected.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, Error> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        let vector = first_embedding(body)?;
        if vector.len() != self.dimension {
            return Err(Error::Parse(format!(
                "expected {} dimensions, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

fn first_embedding(body: EmbeddingResponse) -> Result<Vec<f32>, Error> {
    body.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| Error::Parse("embedding response contained no data".to_string()))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
