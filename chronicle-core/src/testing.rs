//! Testing utilities for the turn pipeline.
//!
//! This module provides tools for integration testing:
//! - `ScriptedModel` for deterministic narration without API calls
//! - `HashEmbedder` for deterministic embeddings
//! - Failing collaborators for best-effort and error paths
//! - `TestHarness` wiring an engine to in-memory stores

use crate::campaign::{CampaignCatalog, BALDURS_GATE_3};
use crate::canon::{CanonError, CanonSearch, CanonSnippet};
use crate::chapters::{ArchivedChapter, ChapterError, ChapterMeta, ChapterStore, InMemoryChapterStore};
use crate::engine::{TurnEngine, TurnError, TurnRequest, TurnResponse};
use crate::memory::{ChapterMemory, Embedder, InMemoryVectorIndex, MemoryError};
use crate::model::{ChatMessage, ChatRole, ModelError, ModelOptions, ModelReply, NarrativeModel};
use crate::state::GameState;
use crate::store::{
    InMemorySessionRepository, SessionKey, SessionRecord, SessionRepository, StoreError, TurnCommit,
    TurnRecord,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Reply used when a `ScriptedModel` runs out of scripted replies.
pub const DEFAULT_REPLY: &str = "The story continues.";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A model invocation captured by [`ScriptedModel`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub options: ModelOptions,
}

impl RecordedCall {
    /// Concatenated system messages.
    pub fn system(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// The final user message.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// A model that returns scripted replies in order.
///
/// `None` entries in the script are failures. Once the script is exhausted
/// the model replies with [`DEFAULT_REPLY`], or fails if built with
/// [`ScriptedModel::failing`].
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    always_fail: bool,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Some(r.into())).collect()),
            ..Default::default()
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.script).push_back(Some(reply.into()));
    }

    pub fn push_failure(&self) {
        lock(&self.script).push_back(None);
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl NarrativeModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        options: &ModelOptions,
    ) -> Result<ModelReply, ModelError> {
        lock(&self.calls).push(RecordedCall {
            messages: messages.to_vec(),
            options: options.clone(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        match next {
            Some(Some(content)) => Ok(ModelReply { content }),
            Some(None) => Err(ModelError::Unavailable("scripted failure".into())),
            None if self.always_fail => Err(ModelError::Unavailable("scripted failure".into())),
            None => Ok(ModelReply {
                content: DEFAULT_REPLY.to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Append an `<engine-struct>` trailer to narration.
pub fn with_trailer(narration: &str, payload: serde_json::Value) -> String {
    format!("{narration}\n\n<engine-struct>{payload}</engine-struct>")
}

/// Deterministic bag-of-words embedding.
///
/// Each lowercase word is hashed into one of `dimension` buckets, so texts
/// sharing words are similar and identical texts embed identically.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            vector[index] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// An embedder that always fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, MemoryError> {
        Err(MemoryError::EmbeddingOther("embedding service unavailable".into()))
    }

    fn dimension(&self) -> usize {
        8
    }
}

/// Canon search returning fixed snippets and recording queries.
#[derive(Default)]
pub struct StaticCanon {
    snippets: Vec<CanonSnippet>,
    queries: Mutex<Vec<String>>,
}

impl StaticCanon {
    pub fn new(snippets: Vec<CanonSnippet>) -> Self {
        Self {
            snippets,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

#[async_trait]
impl CanonSearch for StaticCanon {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CanonSnippet>, CanonError> {
        lock(&self.queries).push(query.to_string());
        Ok(self.snippets.iter().take(limit).cloned().collect())
    }
}

/// Canon search that always fails.
pub struct FailingCanon;

#[async_trait]
impl CanonSearch for FailingCanon {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<CanonSnippet>, CanonError> {
        Err(CanonError::Search("search backend unavailable".into()))
    }
}

/// Chapter store whose writes always fail.
pub struct FailingChapterStore;

#[async_trait]
impl ChapterStore for FailingChapterStore {
    async fn put(&self, _chapter: &ArchivedChapter) -> Result<(), ChapterError> {
        Err(ChapterError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "object storage unavailable",
        )))
    }

    async fn get(&self, thread_id: &str, chapter_id: &str) -> Result<ArchivedChapter, ChapterError> {
        Err(ChapterError::NotFound {
            thread_id: thread_id.to_string(),
            chapter_id: chapter_id.to_string(),
        })
    }

    async fn list(&self, _thread_id: &str) -> Result<Vec<ChapterMeta>, ChapterError> {
        Ok(Vec::new())
    }
}

/// Session repository that reads and creates sessions through `inner` but
/// fails every turn commit.
pub struct FailingSessionRepository {
    inner: Arc<dyn SessionRepository>,
}

impl FailingSessionRepository {
    pub fn new(inner: Arc<dyn SessionRepository>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionRepository for FailingSessionRepository {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        self.inner.find(key).await
    }

    async fn insert_if_absent(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        self.inner.insert_if_absent(record).await
    }

    async fn commit_turn(&self, _commit: TurnCommit) -> Result<SessionRecord, StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "session database unavailable",
        )))
    }

    async fn turns(&self, key: &SessionKey) -> Result<Vec<TurnRecord>, StoreError> {
        self.inner.turns(key).await
    }
}

/// Engine wired to a scripted model and in-memory stores.
///
/// Turns are played as player `Tav` on thread `t1`, user `u1`, in the
/// Baldur's Gate 3 campaign.
pub struct TestHarness {
    pub engine: TurnEngine,
    pub model: Arc<ScriptedModel>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub chapters: Arc<InMemoryChapterStore>,
    pub index: Arc<InMemoryVectorIndex>,
    pub memory: Arc<ChapterMemory>,
    pub thread_id: String,
    pub user_id: String,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(|engine| engine)
    }

    /// Build the default wiring, then let `customize` replace parts of it.
    pub fn with(customize: impl FnOnce(TurnEngine) -> TurnEngine) -> Self {
        Self::with_model(ScriptedModel::default(), customize)
    }

    pub fn with_model(
        model: ScriptedModel,
        customize: impl FnOnce(TurnEngine) -> TurnEngine,
    ) -> Self {
        let model = Arc::new(model);
        let sessions = Arc::new(InMemorySessionRepository::new());
        let chapters = Arc::new(InMemoryChapterStore::new());
        let index = Arc::new(InMemoryVectorIndex::new());
        let memory = Arc::new(ChapterMemory::new(
            Arc::new(HashEmbedder::new(64)),
            index.clone(),
        ));

        let engine = TurnEngine::new(
            Arc::new(CampaignCatalog::builtin()),
            model.clone(),
            sessions.clone(),
        )
        .with_memory(memory.clone())
        .with_chapters(chapters.clone());

        Self {
            engine: customize(engine),
            model,
            sessions,
            chapters,
            index,
            memory,
            thread_id: "t1".to_string(),
            user_id: "u1".to_string(),
        }
    }

    /// A request for the harness session.
    pub fn request(&self, input: &str) -> TurnRequest {
        TurnRequest::new(&self.thread_id, &self.user_id, input)
            .with_campaign(BALDURS_GATE_3)
            .with_player_name("Tav")
    }

    /// Play one turn.
    pub async fn turn(&self, input: &str) -> Result<TurnResponse, TurnError> {
        self.engine.play_turn(self.request(input)).await
    }

    /// Queue `reply`, then play a turn.
    pub async fn turn_with_reply(&self, input: &str, reply: &str) -> Result<TurnResponse, TurnError> {
        self.model.push_reply(reply);
        self.turn(input).await
    }

    /// The stored game state.
    pub async fn game_state(&self) -> Option<GameState> {
        let key = SessionKey::new(&self.thread_id, &self.user_id);
        self.sessions
            .find(&key)
            .await
            .ok()
            .flatten()
            .map(|record| record.game_state)
    }

    pub async fn last_turn_number(&self) -> Option<u64> {
        let key = SessionKey::new(&self.thread_id, &self.user_id);
        self.sessions
            .find(&key)
            .await
            .ok()
            .flatten()
            .map(|record| record.last_turn_number)
    }

    /// System prompt of the most recent model call.
    pub fn last_system_prompt(&self) -> Option<String> {
        self.model.calls().last().map(RecordedCall::system)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the narrative only grew: `after` starts with every entry of `before`.
#[track_caller]
pub fn assert_narrative_extends(before: &GameState, after: &GameState, added: usize) {
    assert_eq!(
        after.narrative.len(),
        before.narrative.len() + added,
        "Expected {added} new narrative entries"
    );
    assert_eq!(
        &after.narrative[..before.narrative.len()],
        &before.narrative[..],
        "Earlier narrative entries changed"
    );
}

/// Assert a resolved stat check obeys the success rule.
#[track_caller]
pub fn assert_stat_check_consistent(response: &TurnResponse) {
    if let Some(sc) = &response.output.stat_check {
        assert!((1..=20).contains(&sc.result), "Roll {} out of range", sc.result);
        assert_eq!(sc.success, i32::from(sc.result) >= sc.difficulty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new(["one", "two"]);
        model.push_failure();
        let opts = ModelOptions::new(0.7);
        let msgs = [ChatMessage::system("sys"), ChatMessage::user("hi")];

        assert_eq!(model.invoke(&msgs, &opts).await.unwrap().content, "one");
        assert_eq!(model.invoke(&msgs, &opts).await.unwrap().content, "two");
        assert!(model.invoke(&msgs, &opts).await.is_err());
        assert_eq!(model.invoke(&msgs, &opts).await.unwrap().content, DEFAULT_REPLY);

        let calls = model.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].system(), "sys");
        assert_eq!(calls[0].last_user(), Some("hi"));
    }

    #[tokio::test]
    async fn test_failing_model() {
        let model = ScriptedModel::failing();
        assert!(model
            .invoke(&[ChatMessage::user("x")], &ModelOptions::new(0.0))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_hash_embedder() {
        let embedder = HashEmbedder::new(32);
        let a = embedder.embed("The Goblin camp").await.unwrap();
        let b = embedder.embed("the goblin CAMP").await.unwrap();
        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
        assert_eq!(a.iter().sum::<f32>(), 3.0);
    }

    #[test]
    fn test_with_trailer() {
        let text = with_trailer("Hi.", serde_json::json!({"choices": ["A"]}));
        assert_eq!(text, "Hi.\n\n<engine-struct>{\"choices\":[\"A\"]}</engine-struct>");
    }

    #[tokio::test]
    async fn test_harness_plays_a_turn() {
        let harness = TestHarness::new();
        let response = harness.turn_with_reply("look", "You see stars.").await.unwrap();
        assert_eq!(response.turn_number, 1);
        assert_eq!(harness.last_turn_number().await, Some(1));
        assert!(harness.last_system_prompt().unwrap().contains("CAMPAIGN CONTEXT:"));
    }
}
