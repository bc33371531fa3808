use super::{
    apply_commit, SessionKey, SessionRecord, SessionRepository, StoreError, TurnCommit, TurnRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

struct Entry {
    record: SessionRecord,
    turns: Vec<TurnRecord>,
}

/// Sessions held in process memory. Used by tests and the harness.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<SessionKey, Entry>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(key)
            .map(|e| e.record.clone()))
    }

    async fn insert_if_absent(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions.entry(record.key.clone()).or_insert_with(|| Entry {
            record,
            turns: Vec::new(),
        });
        Ok(entry.record.clone())
    }

    async fn commit_turn(&self, commit: TurnCommit) -> Result<SessionRecord, StoreError> {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .get_mut(&commit.key)
            .ok_or_else(|| StoreError::NotFound(commit.key.clone()))?;
        apply_commit(&mut entry.record, &commit, Utc::now())?;
        entry.turns.push(commit.turn);
        Ok(entry.record.clone())
    }

    async fn turns(&self, key: &SessionKey) -> Result<Vec<TurnRecord>, StoreError> {
        let sessions = self.sessions.lock().await;
        let entry = sessions
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Ok(entry.turns.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{commit, record};

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let repo = InMemorySessionRepository::new();
        let first = record("t", "u");
        let stored = repo.insert_if_absent(first.clone()).await.unwrap();
        assert_eq!(stored, first);

        let second = record("t", "u");
        let stored = repo.insert_if_absent(second).await.unwrap();
        assert_eq!(stored.id, first.id);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_commit_turn_advances_counter() {
        let repo = InMemorySessionRepository::new();
        let session = repo.insert_if_absent(record("t", "u")).await.unwrap();

        let updated = repo.commit_turn(commit(&session, 0, 1)).await.unwrap();
        assert_eq!(updated.last_turn_number, 1);
        assert_eq!(updated.game_state.narrative.len(), 3);

        let turns = repo.turns(&session.key).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].turn_number, 1);
    }

    #[tokio::test]
    async fn test_stale_commit_is_rejected() {
        let repo = InMemorySessionRepository::new();
        let session = repo.insert_if_absent(record("t", "u")).await.unwrap();
        repo.commit_turn(commit(&session, 0, 1)).await.unwrap();

        let err = repo.commit_turn(commit(&session, 0, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::TurnConflict { expected: 0, found: 1, .. }
        ));
        assert_eq!(repo.turns(&session.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_turn_number_must_follow_counter() {
        let repo = InMemorySessionRepository::new();
        let session = repo.insert_if_absent(record("t", "u")).await.unwrap();
        assert!(repo.commit_turn(commit(&session, 0, 2)).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_session() {
        let repo = InMemorySessionRepository::new();
        let key = SessionKey::new("nope", "u");
        assert!(repo.find(&key).await.unwrap().is_none());
        assert!(matches!(
            repo.turns(&key).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
