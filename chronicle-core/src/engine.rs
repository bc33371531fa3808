//! The turn engine: one player action in, one committed turn out.
//!
//! A turn runs strictly in sequence: load or create the session, gather
//! optional context (chapter memory, web canon), build the prompts, call the
//! narrator, extract the structured trailer, roll any stat check, append to
//! the narrative and commit. Turns for the same `(thread, user)` are
//! serialized through a per-session lock; the repository's compare-and-swap
//! on the turn counter backs that up across processes.
//!
//! Chapter finalization can follow a committed turn. When requested on a
//! turn it is best-effort and reported in [`FinalizeOutcome`]; through
//! [`TurnEngine::save_chapter`] every failure is returned.

use crate::campaign::{CampaignCatalog, CampaignError};
use crate::canon::{canon_note, CanonSearch};
use crate::chapters::{ArchivedChapter, ChapterError, ChapterMeta, ChapterStore};
use crate::dice::{stat_check_seed, strategy_for, DiceError};
use crate::extract::extract;
use crate::memory::{ChapterMemory, ChapterMemoryEntry, MemoryError, DEFAULT_NOTE_TOP_K};
use crate::model::{invoke_with_timeout, ModelError, ModelOptions, NarrativeModel};
use crate::novelize::{DraftSource, NovelContext, Novelizer, NovelizerConfig};
use crate::prompts::{system_prompt, turn_messages, NarrativeStyle, PromptNotes};
use crate::session::{SessionError, SessionHandle, SessionStore};
use crate::state::{Combat, GameState, StatCheck, TurnOutput};
use crate::store::{SessionKey, SessionRecord, SessionRepository, StoreError, TurnRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Choices listed in a chapter scene.
const SCENE_CHOICES: usize = 3;

/// Errors that fail a turn or an explicit chapter save.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("Missing required identifier: {0}")]
    MissingIdentifier(&'static str),

    #[error("Campaign error: {0}")]
    Campaign(#[from] CampaignError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Chapter error: {0}")]
    Chapter(#[from] ChapterError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("No chapter archive configured")]
    ChaptersDisabled,

    #[error("Nothing to novelize")]
    EmptyTranscript,
}

impl From<SessionError> for TurnError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Campaign(e) => TurnError::Campaign(e),
            SessionError::Store(e) => TurnError::Store(e),
        }
    }
}

impl TurnError {
    /// Configuration errors are never worth resubmitting unchanged.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            TurnError::MissingIdentifier(_) | TurnError::Campaign(_) | TurnError::ChaptersDisabled
        )
    }
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub temperature: f32,
    pub max_tokens: usize,
    pub model_timeout: Duration,
    /// Narrative entries replayed to the model as context.
    pub recent_window: usize,
    pub memory_top_k: usize,
    pub default_campaign: String,
    pub default_player_name: String,
    /// Turns novelized by an explicit save without a transcript.
    pub chapter_window: usize,
    /// Query web canon on every turn, not only when a request asks.
    pub web_search: bool,
    pub novelizer: NovelizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            model_timeout: Duration::from_secs(90),
            recent_window: 5,
            memory_top_k: DEFAULT_NOTE_TOP_K,
            default_campaign: crate::campaign::BALDURS_GATE_3.to_string(),
            default_player_name: "Traveler".to_string(),
            chapter_window: 5,
            web_search: false,
            novelizer: NovelizerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window;
        self
    }

    pub fn with_memory_top_k(mut self, top_k: usize) -> Self {
        self.memory_top_k = top_k;
        self
    }

    pub fn with_default_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.default_campaign = campaign_id.into();
        self
    }

    pub fn with_default_player_name(mut self, name: impl Into<String>) -> Self {
        self.default_player_name = name.into();
        self
    }

    pub fn with_chapter_window(mut self, turns: usize) -> Self {
        self.chapter_window = turns;
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    pub fn with_novelizer(mut self, config: NovelizerConfig) -> Self {
        self.novelizer = config;
        self
    }
}

/// One player action.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub thread_id: String,
    pub user_id: String,
    /// Used only when the session is created.
    pub campaign_id: Option<String>,
    /// Used only when the session is created.
    pub player_name: Option<String>,
    pub player_input: String,
    pub style: Option<NarrativeStyle>,
    pub web_search: bool,
    pub finalize_chapter: bool,
}

impl TurnRequest {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        player_input: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            player_input: player_input.into(),
            ..Default::default()
        }
    }

    pub fn with_campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    pub fn with_player_name(mut self, name: impl Into<String>) -> Self {
        self.player_name = Some(name.into());
        self
    }

    pub fn with_style(mut self, style: NarrativeStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    pub fn with_finalize_chapter(mut self, finalize: bool) -> Self {
        self.finalize_chapter = finalize;
        self
    }
}

/// What happened to the chapter requested with a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// No chapter was requested.
    Skipped,
    Saved { chapter_id: String, title: String },
    /// The turn is committed; the chapter is not.
    Failed(String),
}

/// A committed turn.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    pub turn_number: u64,
    pub output: TurnOutput,
    pub game_state: GameState,
    pub finalize: FinalizeOutcome,
}

/// An explicit "save chapter" action.
#[derive(Debug, Clone, Default)]
pub struct SaveChapterRequest {
    pub thread_id: String,
    pub user_id: String,
    /// Text to novelize. Defaults to the session's most recent turns.
    pub transcript: Option<String>,
}

impl SaveChapterRequest {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            transcript: None,
        }
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }
}

/// A stored chapter.
#[derive(Debug, Clone)]
pub struct ChapterReceipt {
    pub meta: ChapterMeta,
    /// Vector record id, when chapter memory is configured.
    pub memory_id: Option<String>,
    pub source: DraftSource,
}

pub struct TurnEngine {
    catalog: Arc<CampaignCatalog>,
    model: Arc<dyn NarrativeModel>,
    sessions: SessionStore,
    memory: Option<Arc<ChapterMemory>>,
    canon: Option<Arc<dyn CanonSearch>>,
    chapters: Option<Arc<dyn ChapterStore>>,
    config: EngineConfig,
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

fn required<'a>(name: &'static str, value: &'a str) -> Result<&'a str, TurnError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(TurnError::MissingIdentifier(name));
    }
    Ok(value)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl TurnEngine {
    pub fn new(
        catalog: Arc<CampaignCatalog>,
        model: Arc<dyn NarrativeModel>,
        repository: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(repository, catalog.clone()),
            catalog,
            model,
            memory: None,
            canon: None,
            chapters: None,
            config: EngineConfig::default(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_memory(mut self, memory: Arc<ChapterMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_canon(mut self, canon: Arc<dyn CanonSearch>) -> Self {
        self.canon = Some(canon);
        self
    }

    pub fn with_chapters(mut self, chapters: Arc<dyn ChapterStore>) -> Self {
        self.chapters = Some(chapters);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CampaignCatalog {
        &self.catalog
    }

    /// Resolve one player action and commit it.
    pub async fn play_turn(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        let thread_id = required("thread_id", &request.thread_id)?;
        let user_id = required("user_id", &request.user_id)?;
        let campaign_id =
            non_empty(request.campaign_id.as_deref()).unwrap_or(&self.config.default_campaign);
        self.catalog.get_campaign(campaign_id)?;

        let key = SessionKey::new(thread_id, user_id);
        let lock = self.session_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(&request, &key, campaign_id).await
        };
        drop(lock);
        self.release_lock(&key).await;
        result
    }

    async fn run_turn(
        &self,
        request: &TurnRequest,
        key: &SessionKey,
        campaign_id: &str,
    ) -> Result<TurnResponse, TurnError> {
        let player_name = non_empty(request.player_name.as_deref())
            .unwrap_or(&self.config.default_player_name);
        let input = request.player_input.trim();

        let (handle, state) = self
            .sessions
            .get_or_create(&key.thread_id, &key.user_id, campaign_id, player_name)
            .await?;
        let campaign = self.catalog.get_campaign(&handle.campaign_id)?;
        let dice = strategy_for(handle.rng_version)?;

        let memory_note = self.memory_note(&key.thread_id, input).await;
        let canon_note = match &self.canon {
            Some(search) if request.web_search || self.config.web_search => {
                canon_note(search.as_ref(), &campaign, &state, input).await
            }
            _ => None,
        };

        let style = NarrativeStyle::resolve(request.style, &campaign);
        let system = system_prompt(
            &campaign,
            &state,
            style,
            PromptNotes {
                memory: memory_note.as_deref(),
                canon: canon_note.as_deref(),
            },
        );
        let messages = turn_messages(system, &state, self.config.recent_window, input);
        let options =
            ModelOptions::new(self.config.temperature).with_max_tokens(self.config.max_tokens);

        tracing::debug!(
            thread_id = %key.thread_id,
            model = self.model.name(),
            style = %style,
            messages = messages.len(),
            "invoking narrator"
        );
        let reply = invoke_with_timeout(
            self.model.as_ref(),
            &messages,
            &options,
            self.config.model_timeout,
        )
        .await?;

        let extracted = extract(&reply.content);
        let turn_number = handle.next_turn_number();
        let stat_check = extracted.stat_check.map(|intent| {
            let seed = stat_check_seed(handle.rng_seed, turn_number, &intent.stat, intent.difficulty);
            StatCheck::from_roll(intent.stat, intent.difficulty, dice.roll_d20(&seed))
        });
        let output = TurnOutput {
            narration: extracted.narration,
            choices: extracted.choices,
            stat_check,
            combat: extracted.combat,
        };

        let game_state = state.with_turn(input, &output.narration, Utc::now());
        let committed = self
            .sessions
            .persist_turn(&handle, game_state.clone(), &output, input)
            .await?;

        tracing::info!(
            thread_id = %key.thread_id,
            user_id = %key.user_id,
            turn_number = committed,
            stat_check = output.stat_check.is_some(),
            combat = output.combat.is_some(),
            source = ?extracted.source,
            "turn committed"
        );

        let finalize = if request.finalize_chapter {
            self.finalize_turn(&handle, committed, &game_state, &output).await
        } else {
            FinalizeOutcome::Skipped
        };

        Ok(TurnResponse {
            turn_number: committed,
            output,
            game_state,
            finalize,
        })
    }

    async fn memory_note(&self, thread_id: &str, input: &str) -> Option<String> {
        let memory = self.memory.as_ref()?;
        match memory
            .memory_note(thread_id, input, self.config.memory_top_k)
            .await
        {
            Ok(note) => note,
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "memory query failed; continuing without memory note");
                None
            }
        }
    }

    async fn finalize_turn(
        &self,
        handle: &SessionHandle,
        turn_number: u64,
        state: &GameState,
        output: &TurnOutput,
    ) -> FinalizeOutcome {
        let transcript = render_scene(
            turn_number,
            &output.narration,
            output.choices.as_deref().unwrap_or_default(),
            output.stat_check.as_ref(),
            output.combat.as_ref(),
        );
        let chapter_id = format!("turn-{turn_number:04}");
        let ctx = novel_context(state, output.stat_check.as_ref(), output.combat.as_ref());

        match self
            .archive_chapter(&handle.key.thread_id, &chapter_id, &transcript, &ctx)
            .await
        {
            Ok(receipt) => FinalizeOutcome::Saved {
                chapter_id: receipt.meta.chapter_id,
                title: receipt.meta.title,
            },
            Err(e) => {
                tracing::warn!(
                    thread_id = %handle.key.thread_id,
                    chapter_id = %chapter_id,
                    error = %e,
                    "automatic chapter finalize failed; turn remains committed"
                );
                FinalizeOutcome::Failed(e.to_string())
            }
        }
    }

    /// Novelize, archive and index a chapter. Every failure is returned.
    pub async fn save_chapter(&self, request: SaveChapterRequest) -> Result<ChapterReceipt, TurnError> {
        let thread_id = required("thread_id", &request.thread_id)?;
        let user_id = required("user_id", &request.user_id)?;
        let key = SessionKey::new(thread_id, user_id);

        let lock = self.session_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_save_chapter(&key, request.transcript.as_deref()).await
        };
        drop(lock);
        self.release_lock(&key).await;
        result
    }

    async fn run_save_chapter(
        &self,
        key: &SessionKey,
        transcript: Option<&str>,
    ) -> Result<ChapterReceipt, TurnError> {
        let record = self
            .sessions
            .find(&key.thread_id, &key.user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let turns = self.sessions.turns(&key.thread_id, &key.user_id).await?;
        let window_start = turns.len().saturating_sub(self.config.chapter_window);
        let recent = &turns[window_start..];

        let transcript = match non_empty(transcript) {
            Some(text) => text.to_string(),
            None => recent
                .iter()
                .map(|t| {
                    render_scene(
                        t.turn_number,
                        &t.narration,
                        &t.choices,
                        t.stat_check.as_ref(),
                        t.combat.as_ref(),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n---\n\n"),
        };
        if transcript.trim().is_empty() {
            return Err(TurnError::EmptyTranscript);
        }

        let last = recent.last();
        let ctx = novel_context(
            &record.game_state,
            last.and_then(|t| t.stat_check.as_ref()),
            last.and_then(|t| t.combat.as_ref()),
        );
        let chapter_id = saved_chapter_id(Utc::now());
        self.archive_chapter(&key.thread_id, &chapter_id, &transcript, &ctx)
            .await
    }

    async fn archive_chapter(
        &self,
        thread_id: &str,
        chapter_id: &str,
        transcript: &str,
        ctx: &NovelContext<'_>,
    ) -> Result<ChapterReceipt, TurnError> {
        let store = self.chapters.as_ref().ok_or(TurnError::ChaptersDisabled)?;

        let draft = Novelizer::new(self.model.clone())
            .with_config(self.config.novelizer.clone())
            .novelize(transcript, ctx)
            .await;
        let chapter = ArchivedChapter::from_draft(thread_id, chapter_id, &draft, Utc::now())?;
        store.put(&chapter).await?;

        let memory_id = match &self.memory {
            Some(memory) => Some(
                memory
                    .index_chapter(ChapterMemoryEntry {
                        thread_id,
                        chapter_id,
                        title: &draft.title,
                        summary: &draft.summary,
                        memo: Some(&draft.memo),
                    })
                    .await?,
            ),
            None => None,
        };

        tracing::info!(
            thread_id,
            chapter_id,
            sha256 = %chapter.meta.sha256,
            source = ?draft.source,
            "chapter saved"
        );
        Ok(ChapterReceipt {
            meta: chapter.meta,
            memory_id,
            source: draft.source,
        })
    }

    /// The stored session, if any.
    pub async fn session(&self, thread_id: &str, user_id: &str) -> Result<Option<SessionRecord>, TurnError> {
        Ok(self.sessions.find(thread_id, user_id).await?)
    }

    /// The session's turn log.
    pub async fn turns(&self, thread_id: &str, user_id: &str) -> Result<Vec<TurnRecord>, TurnError> {
        Ok(self.sessions.turns(thread_id, user_id).await?)
    }

    /// Archived chapters of a thread, oldest first.
    pub async fn chapters(&self, thread_id: &str) -> Result<Vec<ChapterMeta>, TurnError> {
        let store = self.chapters.as_ref().ok_or(TurnError::ChaptersDisabled)?;
        Ok(store.list(thread_id).await?)
    }

    async fn session_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drop the lock entry once nobody else holds or waits on it.
    async fn release_lock(&self, key: &SessionKey) {
        let mut locks = self.locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

/// Millisecond timestamp plus a random suffix; the archive is write-once.
fn saved_chapter_id(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.timestamp_millis(), &suffix[..8])
}

fn novel_context<'a>(
    state: &'a GameState,
    stat_check: Option<&'a StatCheck>,
    combat: Option<&'a Combat>,
) -> NovelContext<'a> {
    NovelContext {
        player_name: &state.player_name,
        location: &state.current_location,
        companions: state.companions.iter().map(String::as_str).collect(),
        stat_check,
        combat,
    }
}

/// Markdown rendering of one turn, as fed to the novelizer.
pub fn render_scene(
    turn_number: u64,
    narration: &str,
    choices: &[String],
    stat_check: Option<&StatCheck>,
    combat: Option<&Combat>,
) -> String {
    let mut scene = format!("### Scene {turn_number}\n\n{}", narration.trim());
    if !choices.is_empty() {
        scene.push_str("\n\n### Choices");
        for (i, choice) in choices.iter().take(SCENE_CHOICES).enumerate() {
            scene.push_str(&format!("\n{}. {choice}", i + 1));
        }
    }
    if let Some(sc) = stat_check {
        scene.push_str(&format!(
            "\n\n> Stat Check: {} (DC {}) | Result {} | {}",
            sc.stat,
            sc.difficulty,
            sc.result,
            if sc.success { "Success" } else { "Fail" }
        ));
    }
    if let Some(c) = combat {
        scene.push_str(&format!(
            "\n\n> Combat: Enemies {} | PlayerHealth {} | EnemyHealth {}",
            c.enemies.join(", "),
            c.player_health,
            c.enemy_health
        ));
    }
    scene
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestHarness;

    #[test]
    fn test_render_scene() {
        let scene = render_scene(
            2,
            " The door groans. ",
            &["Push".into(), "Wait".into(), "Knock".into(), "Leave".into()],
            Some(&StatCheck::from_roll("Strength", 15, 6)),
            None,
        );
        assert_eq!(
            scene,
            "### Scene 2\n\nThe door groans.\n\n### Choices\n1. Push\n2. Wait\n3. Knock\n\n> Stat Check: Strength (DC 15) | Result 6 | Fail"
        );
    }

    #[test]
    fn test_render_scene_combat() {
        let combat = Combat {
            enemies: vec!["Imp".into()],
            player_health: 20.0,
            enemy_health: serde_json::json!({"Imp": 7}),
        };
        let scene = render_scene(1, "Claws.", &[], None, Some(&combat));
        assert!(scene.ends_with("> Combat: Enemies Imp | PlayerHealth 20 | EnemyHealth {\"Imp\":7}"));
    }

    #[test]
    fn test_config_builders() {
        let config = EngineConfig::new()
            .with_temperature(0.2)
            .with_recent_window(2)
            .with_default_player_name("Karlach");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.recent_window, 2);
        assert_eq!(config.default_player_name, "Karlach");
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.chapter_window, 5);
    }

    #[tokio::test]
    async fn test_missing_identifiers_are_config_errors() {
        let harness = TestHarness::new();
        let err = harness
            .engine
            .play_turn(TurnRequest::new("", "u1", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::MissingIdentifier("thread_id")));
        assert!(err.is_config());

        let err = harness
            .engine
            .play_turn(TurnRequest::new("t1", "  ", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::MissingIdentifier("user_id")));
        assert!(harness.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_campaign_is_config_error() {
        let harness = TestHarness::new();
        let err = harness
            .engine
            .play_turn(TurnRequest::new("t1", "u1", "hello").with_campaign("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Campaign(CampaignError::NotFound(_))));
        assert!(harness.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_defaults_fill_campaign_and_player() {
        let harness = TestHarness::new();
        harness.model.push_reply("You wake.");
        let response = harness
            .engine
            .play_turn(TurnRequest::new("t1", "u1", "wake up"))
            .await
            .unwrap();
        assert_eq!(response.game_state.player_name, "Traveler");
        assert_eq!(response.game_state.campaign_id, "baldurs-gate-3");
        assert_eq!(response.finalize, FinalizeOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_lock_table_is_pruned() {
        let harness = TestHarness::new();
        harness.model.push_reply("Quiet.");
        harness.turn("listen").await.unwrap();
        assert!(harness.engine.locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_chapter_requires_session() {
        let harness = TestHarness::new();
        let err = harness
            .engine
            .save_chapter(SaveChapterRequest::new("t1", "u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Store(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_blank_transcript_uses_turn_log() {
        let harness = TestHarness::new();
        harness.model.push_reply("Hi.");
        harness.turn("hello").await.unwrap();

        // A whitespace transcript falls back to the turn log, which has one turn.
        let receipt = harness
            .engine
            .save_chapter(SaveChapterRequest::new("t1", "u1").with_transcript("   "))
            .await
            .unwrap();
        assert!(!receipt.meta.title.is_empty());
    }

    #[test]
    fn test_saved_chapter_ids_differ_within_a_millisecond() {
        let at = Utc::now();
        let a = saved_chapter_id(at);
        let b = saved_chapter_id(at);
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("{}-", at.timestamp_millis())));
    }
}
