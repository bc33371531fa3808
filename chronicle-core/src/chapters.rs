//! Immutable chapter archive.
//!
//! Each novelized chapter is stored once under
//! `threads/{thread}/chapters/{chapter}/v1.md`, alongside metadata recording
//! its size and SHA-256 digest. Chapters are never overwritten: a second `put`
//! for the same key fails with [`ChapterError::AlreadyExists`]. Reads verify
//! the digest so silent corruption surfaces as an error.

use crate::novelize::ChapterDraft;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

/// Current archive layout version, part of every key.
pub const CHAPTER_FORMAT_VERSION: u32 = 1;

pub const CHAPTER_MIME: &str = "text/markdown; charset=utf-8";

/// Errors from chapter archival.
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("Chapter {thread_id}/{chapter_id} already exists")]
    AlreadyExists {
        thread_id: String,
        chapter_id: String,
    },

    #[error("Chapter {thread_id}/{chapter_id} not found")]
    NotFound {
        thread_id: String,
        chapter_id: String,
    },

    #[error("Chapter digest mismatch: expected {expected}, found {found}")]
    IntegrityMismatch { expected: String, found: String },

    #[error("Invalid chapter identifier: {0:?}")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Lowercase hex SHA-256 of `content`.
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Storage key for a chapter body.
pub fn chapter_key(thread_id: &str, chapter_id: &str, version: u32) -> String {
    format!("threads/{thread_id}/chapters/{chapter_id}/v{version}.md")
}

/// Everything about a chapter except its body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMeta {
    pub thread_id: String,
    pub chapter_id: String,
    pub version: u32,
    pub key: String,
    pub title: String,
    pub summary: String,
    pub memo: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

/// A chapter with its body.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedChapter {
    pub meta: ChapterMeta,
    pub content: String,
}

impl ArchivedChapter {
    /// Seal a draft: compute key, size and digest.
    pub fn from_draft(
        thread_id: &str,
        chapter_id: &str,
        draft: &ChapterDraft,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ChapterError> {
        for id in [thread_id, chapter_id] {
            if id.trim().is_empty() {
                return Err(ChapterError::InvalidId(id.to_string()));
            }
        }
        let bytes = draft.content.as_bytes();
        Ok(Self {
            meta: ChapterMeta {
                thread_id: thread_id.to_string(),
                chapter_id: chapter_id.to_string(),
                version: CHAPTER_FORMAT_VERSION,
                key: chapter_key(thread_id, chapter_id, CHAPTER_FORMAT_VERSION),
                title: draft.title.clone(),
                summary: draft.summary.clone(),
                memo: draft.memo.clone(),
                mime_type: CHAPTER_MIME.to_string(),
                size_bytes: bytes.len() as u64,
                sha256: sha256_hex(bytes),
                created_at,
            },
            content: draft.content.clone(),
        })
    }

    /// Check the body against the recorded digest.
    pub fn verify(&self) -> Result<(), ChapterError> {
        let found = sha256_hex(self.content.as_bytes());
        if found != self.meta.sha256 {
            return Err(ChapterError::IntegrityMismatch {
                expected: self.meta.sha256.clone(),
                found,
            });
        }
        Ok(())
    }
}

/// Write-once chapter storage.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    /// Store a new chapter. Fails if the key already exists.
    async fn put(&self, chapter: &ArchivedChapter) -> Result<(), ChapterError>;

    /// Load and verify a chapter.
    async fn get(&self, thread_id: &str, chapter_id: &str) -> Result<ArchivedChapter, ChapterError>;

    /// Metadata for every chapter of a thread, oldest first.
    async fn list(&self, thread_id: &str) -> Result<Vec<ChapterMeta>, ChapterError>;
}

fn sort_oldest_first(metas: &mut [ChapterMeta]) {
    metas.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.chapter_id.cmp(&b.chapter_id))
    });
}

/// Chapters held in memory.
#[derive(Default)]
pub struct InMemoryChapterStore {
    chapters: Mutex<BTreeMap<(String, String), ArchivedChapter>>,
}

impl InMemoryChapterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChapterStore for InMemoryChapterStore {
    async fn put(&self, chapter: &ArchivedChapter) -> Result<(), ChapterError> {
        let mut chapters = self.chapters.lock().await;
        let key = (chapter.meta.thread_id.clone(), chapter.meta.chapter_id.clone());
        if chapters.contains_key(&key) {
            return Err(ChapterError::AlreadyExists {
                thread_id: key.0,
                chapter_id: key.1,
            });
        }
        chapters.insert(key, chapter.clone());
        Ok(())
    }

    async fn get(&self, thread_id: &str, chapter_id: &str) -> Result<ArchivedChapter, ChapterError> {
        let chapters = self.chapters.lock().await;
        let chapter = chapters
            .get(&(thread_id.to_string(), chapter_id.to_string()))
            .cloned()
            .ok_or_else(|| ChapterError::NotFound {
                thread_id: thread_id.to_string(),
                chapter_id: chapter_id.to_string(),
            })?;
        chapter.verify()?;
        Ok(chapter)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<ChapterMeta>, ChapterError> {
        let chapters = self.chapters.lock().await;
        let mut metas: Vec<ChapterMeta> = chapters
            .values()
            .filter(|c| c.meta.thread_id == thread_id)
            .map(|c| c.meta.clone())
            .collect();
        sort_oldest_first(&mut metas);
        Ok(metas)
    }
}

/// Chapters on disk under a root directory.
///
/// Layout: `{root}/threads/{thread}/chapters/{chapter}/v1.md` plus a
/// `v1.json` metadata file beside it. Identifiers that are not plain
/// `[A-Za-z0-9._-]` names are replaced by a hash on disk.
pub struct FileChapterStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileChapterStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root
            .join("threads")
            .join(path_segment(thread_id))
            .join("chapters")
    }

    fn chapter_dir(&self, thread_id: &str, chapter_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join(path_segment(chapter_id))
    }

    async fn read_meta(path: &Path) -> Result<ChapterMeta, ChapterError> {
        let raw = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn path_segment(id: &str) -> String {
    let plain = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if plain {
        id.to_string()
    } else {
        format!("x-{}", &sha256_hex(id.as_bytes())[..32])
    }
}

#[async_trait]
impl ChapterStore for FileChapterStore {
    async fn put(&self, chapter: &ArchivedChapter) -> Result<(), ChapterError> {
        let _guard = self.write_lock.lock().await;
        let meta = &chapter.meta;
        let dir = self.chapter_dir(&meta.thread_id, &meta.chapter_id);
        let body_path = dir.join(format!("v{}.md", meta.version));
        let meta_path = dir.join(format!("v{}.json", meta.version));

        if fs::try_exists(&meta_path).await? {
            return Err(ChapterError::AlreadyExists {
                thread_id: meta.thread_id.clone(),
                chapter_id: meta.chapter_id.clone(),
            });
        }

        fs::create_dir_all(&dir).await?;
        fs::write(&body_path, chapter.content.as_bytes()).await?;
        // Metadata last: its presence marks the chapter as committed.
        fs::write(&meta_path, serde_json::to_string_pretty(meta)?).await?;
        tracing::debug!(key = %meta.key, bytes = meta.size_bytes, "chapter archived");
        Ok(())
    }

    async fn get(&self, thread_id: &str, chapter_id: &str) -> Result<ArchivedChapter, ChapterError> {
        let dir = self.chapter_dir(thread_id, chapter_id);
        let meta_path = dir.join(format!("v{CHAPTER_FORMAT_VERSION}.json"));
        if !fs::try_exists(&meta_path).await? {
            return Err(ChapterError::NotFound {
                thread_id: thread_id.to_string(),
                chapter_id: chapter_id.to_string(),
            });
        }
        let meta = Self::read_meta(&meta_path).await?;
        let content = fs::read_to_string(dir.join(format!("v{}.md", meta.version))).await?;
        let chapter = ArchivedChapter { meta, content };
        chapter.verify()?;
        Ok(chapter)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<ChapterMeta>, ChapterError> {
        let dir = self.thread_dir(thread_id);
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut metas = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta_path = entry
                .path()
                .join(format!("v{CHAPTER_FORMAT_VERSION}.json"));
            if fs::try_exists(&meta_path).await? {
                metas.push(Self::read_meta(&meta_path).await?);
            }
        }
        sort_oldest_first(&mut metas);
        Ok(metas)
    }
}
