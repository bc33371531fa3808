//! Best-effort web canon lookup.
//!
//! A [`CanonSearch`] returns a few reference snippets about the campaign's
//! setting. The engine folds them into the system prompt as a "canon
//! references" note. Failures never reach the player: a failed search just
//! omits the note.

use crate::campaign::Campaign;
use crate::state::GameState;
use crate::text::{clip, collapse_whitespace};
use async_trait::async_trait;
use thiserror::Error;

/// Results requested per search.
pub const DEFAULT_CANON_RESULTS: usize = 3;

const SNIPPET_CHARS: usize = 220;
const INPUT_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("Canon search failed: {0}")]
    Search(String),
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonSnippet {
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
}

#[async_trait]
pub trait CanonSearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CanonSnippet>, CanonError>;
}

/// Build the search query for a turn.
pub fn canon_query(campaign: &Campaign, state: &GameState, player_input: &str) -> String {
    let mut parts = Vec::new();
    match campaign.canon_query_hint.as_deref() {
        Some(hint) => parts.push(hint.to_string()),
        None => parts.push(campaign.name.clone()),
    }
    let input = collapse_whitespace(player_input);
    if !input.is_empty() {
        parts.push(clip(&input, INPUT_CHARS).to_string());
    }
    if !state.current_location.is_empty() {
        parts.push(format!("location:{}", state.current_location));
    }
    if !state.companions.is_empty() {
        let names: Vec<&str> = state.companions.iter().take(3).map(String::as_str).collect();
        parts.push(format!("companions:{}", names.join(",")));
    }
    parts.join(" | ")
}

/// Render snippets as a prompt note, or `None` if there are none.
pub fn format_canon_note(snippets: &[CanonSnippet]) -> Option<String> {
    let lines: Vec<String> = snippets
        .iter()
        .filter_map(|s| {
            let snippet = collapse_whitespace(&s.snippet);
            if snippet.is_empty() {
                return None;
            }
            let title = collapse_whitespace(&s.title);
            let title = if title.is_empty() { "Untitled" } else { title.as_str() };
            Some(format!("- {}: {}", title, clip(&snippet, SNIPPET_CHARS)))
        })
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("Canon references (web):\n{}", lines.join("\n")))
}

/// Search and format in one step. Errors are logged and swallowed.
pub async fn canon_note(
    search: &dyn CanonSearch,
    campaign: &Campaign,
    state: &GameState,
    player_input: &str,
) -> Option<String> {
    let query = canon_query(campaign, state, player_input);
    match search.search(&query, DEFAULT_CANON_RESULTS).await {
        Ok(snippets) => format_canon_note(&snippets),
        Err(e) => {
            tracing::warn!(error = %e, "canon search failed; continuing without canon note");
            None
        }
    }
}
