//! Chapter novelizer: rewrites a game transcript as third-person prose.
//!
//! The model is asked for a JSON object `{title, chapter, summary, memo}`.
//! Anything else (a timeout, a provider error, prose without JSON, JSON
//! missing its body) falls back to a local sanitizer, so novelization always
//! produces a usable [`ChapterDraft`].

use crate::extract::normalize;
use crate::model::{invoke_with_timeout, ChatMessage, ModelOptions, NarrativeModel};
use crate::prompts::novelize_system_prompt;
use crate::state::{Combat, StatCheck};
use crate::text::{clip, sentences};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const MAX_TITLE_CHARS: usize = 120;
pub const FALLBACK_TITLE_CHARS: usize = 80;
pub const MAX_SUMMARY_CHARS: usize = 600;
pub const MAX_MEMO_CHARS: usize = 240;
pub const UNTITLED: &str = "Untitled Chapter";

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

static INLINE_GAPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

static MECHANICS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)<engine-struct>.*?</engine-struct>",
        r"(?i)Make an?\s+\w+\s+check\s*\(DC\s*\d+\)\.?",
        r"(?i)\[(?:Roll|Check):?\s*\d+\]",
        r"(?i)\(d\d+\s*=\s*\d+\)",
        r"(?m)^[ \t]*#{1,6}[ \t].*$",
        r"(?mi)^[ \t]*>[ \t]*(?:stat check|combat):.*$",
        r"(?m)^[ \t]*\d+\.[ \t].*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Novelizer tuning.
#[derive(Debug, Clone)]
pub struct NovelizerConfig {
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl Default for NovelizerConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

impl NovelizerConfig {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Facts about the scene handed to the model alongside the transcript.
#[derive(Debug, Clone, Default)]
pub struct NovelContext<'a> {
    pub player_name: &'a str,
    pub location: &'a str,
    pub companions: Vec<&'a str>,
    pub stat_check: Option<&'a StatCheck>,
    pub combat: Option<&'a Combat>,
}

/// How a draft was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftSource {
    Model,
    Fallback,
}

/// A novelized chapter, not yet archived.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterDraft {
    pub title: String,
    pub content: String,
    pub summary: String,
    pub memo: String,
    pub source: DraftSource,
}

pub struct Novelizer {
    model: Arc<dyn NarrativeModel>,
    config: NovelizerConfig,
}

impl Novelizer {
    pub fn new(model: Arc<dyn NarrativeModel>) -> Self {
        Self {
            model,
            config: NovelizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: NovelizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Turn `transcript` into a chapter. Never fails.
    pub async fn novelize(&self, transcript: &str, ctx: &NovelContext<'_>) -> ChapterDraft {
        let messages = [
            ChatMessage::system(novelize_system_prompt(ctx.player_name)),
            ChatMessage::user(user_message(transcript, ctx)),
        ];
        let options = ModelOptions::new(self.config.temperature).with_max_tokens(self.config.max_tokens);

        match invoke_with_timeout(self.model.as_ref(), &messages, &options, self.config.timeout).await {
            Ok(reply) => match parse_chapter_reply(&reply.content, transcript) {
                Some(draft) => draft,
                None => {
                    tracing::warn!("novelizer reply was not usable JSON; using local sanitizer");
                    sanitize_fallback(transcript)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "novelizer model call failed; using local sanitizer");
                sanitize_fallback(transcript)
            }
        }
    }
}

fn user_message(transcript: &str, ctx: &NovelContext<'_>) -> String {
    let companions = if ctx.companions.is_empty() {
        "None".to_string()
    } else {
        ctx.companions.join(", ")
    };
    let stat = match ctx.stat_check {
        Some(sc) => format!(
            "{} DC {} rolled {} ({})",
            sc.stat,
            sc.difficulty,
            sc.result,
            if sc.success { "success" } else { "failure" }
        ),
        None => "none".to_string(),
    };
    let combat = match ctx.combat {
        Some(c) if !c.enemies.is_empty() => c.enemies.join(", "),
        Some(_) => "active".to_string(),
        None => "none".to_string(),
    };
    format!(
        "GAME CONTEXT\nPlayer: {}\nLocation: {}\nCompanions: {companions}\nNotes: StatCheck {stat} | Combat {combat}\n\nRAW NARRATION\n{transcript}\n\nReturn JSON only.",
        ctx.player_name, ctx.location
    )
}

fn non_empty_str<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parse the model's JSON reply. `None` when no JSON object can be found.
pub fn parse_chapter_reply(reply: &str, transcript: &str) -> Option<ChapterDraft> {
    let span = JSON_OBJECT.find(reply)?;
    let json: Value = serde_json::from_str(span.as_str()).ok()?;
    if !json.is_object() {
        return None;
    }

    let content = non_empty_str(&json, "chapter")
        .or_else(|| non_empty_str(&json, "artifact"))
        .map(str::to_string)
        .unwrap_or_else(|| strip_mechanics(transcript));
    if content.is_empty() {
        return None;
    }
    let title = non_empty_str(&json, "title")
        .map(|t| clip(t, MAX_TITLE_CHARS).to_string())
        .unwrap_or_else(|| UNTITLED.to_string());
    let summary = clip(non_empty_str(&json, "summary").unwrap_or(&content), MAX_SUMMARY_CHARS).to_string();
    let memo = clip(non_empty_str(&json, "memo").unwrap_or(""), MAX_MEMO_CHARS).to_string();

    Some(ChapterDraft {
        title,
        content,
        summary,
        memo,
        source: DraftSource::Model,
    })
}

/// Strip mechanics from a transcript without a model.
pub fn strip_mechanics(transcript: &str) -> String {
    let mut text = normalize(transcript);
    for pattern in MECHANICS.iter() {
        text = pattern.replace_all(&text, "").into_owned();
    }
    normalize(&INLINE_GAPS.replace_all(&text, " "))
}

/// Deterministic chapter built from the transcript alone.
pub fn sanitize_fallback(transcript: &str) -> ChapterDraft {
    let mut content = strip_mechanics(transcript);
    if content.is_empty() {
        content = normalize(transcript);
    }

    let title = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| clip(l, FALLBACK_TITLE_CHARS).to_string())
        .unwrap_or_else(|| UNTITLED.to_string());
    let summary = clip(&content, MAX_SUMMARY_CHARS).to_string();
    let memo = sentences(&content)
        .last()
        .map(|s| clip(s, MAX_MEMO_CHARS).to_string())
        .unwrap_or_default();

    ChapterDraft {
        title,
        content,
        summary,
        memo,
        source: DraftSource::Fallback,
    }
}
