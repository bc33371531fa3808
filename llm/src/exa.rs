//! Exa web search client.

use crate::{check_status, http_client, Error};
use serde::{Deserialize, Serialize};

const API_BASE: &str = "https://api.exa.ai";
const MAX_TEXT_CHARS: usize = 1000;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: Option<String>,
    pub text: String,
}

/// Client for Exa's `/search` endpoint.
#[derive(Clone)]
pub struct ExaSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ExaSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Create a client from `EXA_API_KEY`.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("EXA_API_KEY").map_err(|_| Error::NoApiKey("EXA_API_KEY"))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Search and return up to `limit` results with page text. Results with
    /// no text are dropped.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, Error> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", &self.api_key)
            .json(&SearchRequest {
                query,
                num_results: limit,
                contents: Contents {
                    text: TextOptions {
                        max_characters: MAX_TEXT_CHARS,
                    },
                },
            })
            .send()
            .await?;
        let response = check_status(response).await?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(into_results(body))
    }
}

fn into_results(body: SearchResponse) -> Vec<SearchResult> {
    body.results
        .into_iter()
        .filter_map(|r| {
            let text = r.text.unwrap_or_default();
            if text.trim().is_empty() {
                return None;
            }
            Some(SearchResult {
                title: r.title.unwrap_or_default(),
                url: r.url,
                text,
            })
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: usize,
    contents: Contents,
}

#[derive(Serialize)]
struct Contents {
    text: TextOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    max_characters: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
}

#[derive(Deserialize)]
struct ApiResult {
    title: Option<String>,
    url: Option<String>,
    text: Option<String>,
}
