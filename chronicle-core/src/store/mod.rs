//! Session persistence.
//!
//! A session binds a `(thread, user)` pair to one evolving [`GameState`]
//! plus the bookkeeping needed to make dice rolls reproducible: a seed fixed
//! at creation, the RNG algorithm version, and a turn counter. Every resolved
//! turn is committed together with an immutable [`TurnRecord`].

mod file;
mod memory;

pub use file::FileSessionRepository;
pub use memory::InMemorySessionRepository;

use crate::state::{Combat, GameState, StatCheck};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from session persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Turn conflict on {key}: expected last turn {expected}, found {found}")]
    TurnConflict {
        key: SessionKey,
        expected: u64,
        found: u64,
    },

    #[error("Session not found: {0}")]
    NotFound(SessionKey),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Identity of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub thread_id: String,
    pub user_id: String,
}

impl SessionKey {
    pub fn new(thread_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.user_id)
    }
}

/// The stored session row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub key: SessionKey,
    pub id: String,
    pub campaign_id: String,
    pub player_name: String,
    pub rng_seed: u32,
    pub rng_version: u32,
    pub last_turn_number: u64,
    pub game_state: GameState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One resolved turn. Never modified after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRecord {
    pub turn_number: u64,
    pub player_input: String,
    pub narration: String,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_check: Option<StatCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat: Option<Combat>,
    pub created_at: DateTime<Utc>,
}

/// A turn to commit: the session update and the turn insert travel together.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub key: SessionKey,
    /// The `last_turn_number` the caller read before resolving the turn.
    pub expected_last_turn: u64,
    pub game_state: GameState,
    pub turn: TurnRecord,
}

/// Storage backend for sessions and their turn logs.
///
/// `commit_turn` must apply the session update and the turn insert
/// atomically, and only if the stored `last_turn_number` still equals
/// `expected_last_turn`. On success the counter becomes
/// `expected_last_turn + 1`, which must equal `turn.turn_number`.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert `record` unless a session already exists for its key.
    /// Returns whichever record is stored afterwards.
    async fn insert_if_absent(&self, record: SessionRecord) -> Result<SessionRecord, StoreError>;

    /// Returns the updated session.
    async fn commit_turn(&self, commit: TurnCommit) -> Result<SessionRecord, StoreError>;

    /// The turn log, in turn order.
    async fn turns(&self, key: &SessionKey) -> Result<Vec<TurnRecord>, StoreError>;
}

/// Apply a commit to a record in place after checking the counter.
///
/// Shared by the repository implementations so both enforce the same rules.
pub(crate) fn apply_commit(
    record: &mut SessionRecord,
    commit: &TurnCommit,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let next = commit.expected_last_turn + 1;
    if record.last_turn_number != commit.expected_last_turn || commit.turn.turn_number != next {
        return Err(StoreError::TurnConflict {
            key: commit.key.clone(),
            expected: commit.expected_last_turn,
            found: record.last_turn_number,
        });
    }
    record.last_turn_number = next;
    record.game_state = commit.game_state.clone();
    record.updated_at = now;
    Ok(())
}
