//! Get-or-create and turn persistence on top of a [`SessionRepository`].

use crate::campaign::{CampaignCatalog, CampaignError};
use crate::dice::CURRENT_RNG_VERSION;
use crate::state::{GameState, TurnOutput};
use crate::store::{SessionKey, SessionRecord, SessionRepository, StoreError, TurnCommit, TurnRecord};
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;

/// Seeds are drawn uniformly from `[0, 2^31)`.
const RNG_SEED_BOUND: u32 = 1 << 31;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the engine needs to resolve and commit a turn.
///
/// A snapshot: `last_turn_number` is the value read when the handle was
/// obtained. Committing with a stale handle fails with a turn conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub key: SessionKey,
    pub id: String,
    pub campaign_id: String,
    pub player_name: String,
    pub rng_seed: u32,
    pub rng_version: u32,
    pub last_turn_number: u64,
}

impl SessionHandle {
    fn from_record(record: &SessionRecord) -> Self {
        Self {
            key: record.key.clone(),
            id: record.id.clone(),
            campaign_id: record.campaign_id.clone(),
            player_name: record.player_name.clone(),
            rng_seed: record.rng_seed,
            rng_version: record.rng_version,
            last_turn_number: record.last_turn_number,
        }
    }

    /// Turn number the next resolved turn will take.
    pub fn next_turn_number(&self) -> u64 {
        self.last_turn_number + 1
    }
}

pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    catalog: Arc<CampaignCatalog>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, catalog: Arc<CampaignCatalog>) -> Self {
        Self { repo, catalog }
    }

    /// Load the session for `(thread_id, user_id)`, creating it on first use.
    ///
    /// An existing session is returned unchanged: `campaign_id` and
    /// `player_name` only matter on creation.
    pub async fn get_or_create(
        &self,
        thread_id: &str,
        user_id: &str,
        campaign_id: &str,
        player_name: &str,
    ) -> Result<(SessionHandle, GameState), SessionError> {
        let key = SessionKey::new(thread_id, user_id);
        if let Some(record) = self.repo.find(&key).await? {
            return Ok((SessionHandle::from_record(&record), record.game_state));
        }

        let game_state = self.catalog.create_initial_game_state(campaign_id, player_name)?;
        let now = Utc::now();
        let record = SessionRecord {
            key,
            id: uuid::Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            player_name: player_name.to_string(),
            rng_seed: rand::thread_rng().gen_range(0..RNG_SEED_BOUND),
            rng_version: CURRENT_RNG_VERSION,
            last_turn_number: 0,
            game_state,
            created_at: now,
            updated_at: now,
        };

        // Another writer may have created it between find and insert.
        let stored = self.repo.insert_if_absent(record).await?;
        tracing::info!(
            thread_id,
            user_id,
            campaign_id = %stored.campaign_id,
            "session ready"
        );
        Ok((SessionHandle::from_record(&stored), stored.game_state))
    }

    /// Commit a resolved turn. Returns the turn number it was stored under.
    pub async fn persist_turn(
        &self,
        handle: &SessionHandle,
        game_state: GameState,
        output: &TurnOutput,
        player_input: &str,
    ) -> Result<u64, SessionError> {
        let turn_number = handle.next_turn_number();
        let commit = TurnCommit {
            key: handle.key.clone(),
            expected_last_turn: handle.last_turn_number,
            game_state,
            turn: TurnRecord {
                turn_number,
                player_input: player_input.to_string(),
                narration: output.narration.clone(),
                choices: output.choices.clone().unwrap_or_default(),
                stat_check: output.stat_check.clone(),
                combat: output.combat.clone(),
                created_at: Utc::now(),
            },
        };
        let updated = self.repo.commit_turn(commit).await?;
        Ok(updated.last_turn_number)
    }

    pub async fn turns(&self, thread_id: &str, user_id: &str) -> Result<Vec<TurnRecord>, SessionError> {
        Ok(self.repo.turns(&SessionKey::new(thread_id, user_id)).await?)
    }

    pub async fn find(&self, thread_id: &str, user_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.repo.find(&SessionKey::new(thread_id, user_id)).await?)
    }
}
