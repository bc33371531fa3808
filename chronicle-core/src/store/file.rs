//! File-backed sessions: one versioned JSON document per session.

use super::{
    apply_commit, SessionKey, SessionRecord, SessionRepository, StoreError, TurnCommit, TurnRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

/// Current session file version.
const SESSION_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    version: u32,
    session: SessionRecord,
    #[serde(default)]
    turns: Vec<TurnRecord>,
}

/// Stores each session, with its full turn log, in
/// `{root}/sessions/{digest}.json`.
///
/// The session row and its turns live in the same document, and each write
/// replaces the document through a temp file and rename. A commit therefore
/// lands completely or not at all.
pub struct FileSessionRepository {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionRepository {
    /// Open (creating if needed) a repository under `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = root.as_ref().join("sessions");
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.thread_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.user_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        self.dir.join(format!("{}.json", &digest[..32]))
    }

    async fn load(&self, key: &SessionKey) -> Result<Option<SessionDocument>, StoreError> {
        let path = self.path_for(key);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).await?;
        let doc: SessionDocument = serde_json::from_str(&raw)?;
        if doc.version != SESSION_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SESSION_FORMAT_VERSION,
                found: doc.version,
            });
        }
        Ok(Some(doc))
    }

    async fn store(&self, doc: &SessionDocument) -> Result<(), StoreError> {
        let path = self.path_for(&doc.session.key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn find(&self, key: &SessionKey) -> Result<Option<SessionRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load(key).await?.map(|doc| doc.session))
    }

    async fn insert_if_absent(&self, record: SessionRecord) -> Result<SessionRecord, StoreError> {
        let _guard = self.lock.lock().await;
        if let Some(existing) = self.load(&record.key).await? {
            return Ok(existing.session);
        }
        let doc = SessionDocument {
            version: SESSION_FORMAT_VERSION,
            session: record,
            turns: Vec::new(),
        };
        self.store(&doc).await?;
        tracing::debug!(key = %doc.session.key, "session file created");
        Ok(doc.session)
    }

    async fn commit_turn(&self, commit: TurnCommit) -> Result<SessionRecord, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = self
            .load(&commit.key)
            .await?
            .ok_or_else(|| StoreError::NotFound(commit.key.clone()))?;
        apply_commit(&mut doc.session, &commit, Utc::now())?;
        doc.turns.push(commit.turn);
        self.store(&doc).await?;
        Ok(doc.session)
    }

    async fn turns(&self, key: &SessionKey) -> Result<Vec<TurnRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.load(key)
            .await?
            .map(|doc| doc.turns)
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}
