//! Chapter memory: semantic recall of earlier chapters within one thread.
//!
//! Each finalized chapter is embedded (summary plus memo) and upserted into a
//! vector index under the id `"{thread_id}:{chapter_id}"`. Retrieval is always
//! scoped to a single thread; [`VectorIndex::query`] cannot be called without
//! a [`ThreadFilter`], so one player's story never leaks into another's.
//!
//! The index namespace is created lazily and idempotently before every use.

mod index;

pub use index::InMemoryVectorIndex;

use crate::text::clip;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Namespace chapters are indexed under unless configured otherwise.
pub const DEFAULT_NAMESPACE: &str = "chronicle-chapters";

/// How many prior chapters feed the prompt's memory note.
pub const DEFAULT_NOTE_TOP_K: usize = 3;

/// Summary characters shown per chapter in the memory note.
const NOTE_SUMMARY_CHARS: usize = 200;

/// Errors from embedding and vector index operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("A thread id is required for memory operations")]
    MissingThread,

    #[error("A chapter id is required for indexing")]
    MissingChapter,

    #[error("Embedding failed: {0}")]
    Embedding(#[from] llm::Error),

    #[error("Embedding failed: {0}")]
    EmbeddingOther(String),

    #[error("Vector dimension mismatch: index expects {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Vector namespace {0} does not exist")]
    MissingNamespace(String),

    #[error("Vector index error: {0}")]
    Index(String),
}

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoryError>;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;
}

/// Metadata stored alongside each chapter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterMetadata {
    pub thread_id: String,
    pub chapter_id: String,
    pub title: String,
    pub summary: String,
}

/// A vector plus its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChapterMetadata,
}

/// One retrieval hit, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChapterMetadata,
}

/// Equality filter on `thread_id`. Required for every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadFilter {
    thread_id: String,
}

impl ThreadFilter {
    pub fn new(thread_id: impl Into<String>) -> Result<Self, MemoryError> {
        let thread_id = thread_id.into();
        if thread_id.trim().is_empty() {
            return Err(MemoryError::MissingThread);
        }
        Ok(Self { thread_id })
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn matches(&self, metadata: &ChapterMetadata) -> bool {
        metadata.thread_id == self.thread_id
    }
}

/// A namespaced vector store with cosine similarity.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the namespace if it does not exist. Safe to call repeatedly.
    async fn ensure_namespace(&self, namespace: &str, dimension: usize) -> Result<(), MemoryError>;

    /// Insert or replace a record by id.
    async fn upsert(&self, namespace: &str, record: MemoryRecord) -> Result<(), MemoryError>;

    /// Nearest records within the filtered thread, best first.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: &ThreadFilter,
    ) -> Result<Vec<MemoryMatch>, MemoryError>;
}

/// A chapter ready to be remembered.
#[derive(Debug, Clone)]
pub struct ChapterMemoryEntry<'a> {
    pub thread_id: &'a str,
    pub chapter_id: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub memo: Option<&'a str>,
}

/// Record id for a chapter.
pub fn record_id(thread_id: &str, chapter_id: &str) -> String {
    format!("{thread_id}:{chapter_id}")
}

/// Text embedded for a chapter: the summary, plus the memo when there is one.
pub fn embedding_text(summary: &str, memo: Option<&str>) -> String {
    match memo.map(str::trim).filter(|m| !m.is_empty()) {
        Some(memo) => format!("{summary}\n\nMemo: {memo}"),
        None => summary.to_string(),
    }
}

/// Indexes chapters and retrieves the relevant ones for a new turn.
#[derive(Clone)]
pub struct ChapterMemory {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    namespace: String,
}

impl ChapterMemory {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ensure(&self) -> Result<(), MemoryError> {
        self.index
            .ensure_namespace(&self.namespace, self.embedder.dimension())
            .await
    }

    /// Embed and upsert a chapter. Returns the record id.
    pub async fn index_chapter(&self, entry: ChapterMemoryEntry<'_>) -> Result<String, MemoryError> {
        if entry.thread_id.trim().is_empty() {
            return Err(MemoryError::MissingThread);
        }
        if entry.chapter_id.trim().is_empty() {
            return Err(MemoryError::MissingChapter);
        }
        self.ensure().await?;

        let vector = self
            .embedder
            .embed(&embedding_text(entry.summary, entry.memo))
            .await?;
        let id = record_id(entry.thread_id, entry.chapter_id);
        self.index
            .upsert(
                &self.namespace,
                MemoryRecord {
                    id: id.clone(),
                    vector,
                    metadata: ChapterMetadata {
                        thread_id: entry.thread_id.to_string(),
                        chapter_id: entry.chapter_id.to_string(),
                        title: entry.title.to_string(),
                        summary: entry.summary.to_string(),
                    },
                },
            )
            .await?;

        tracing::info!(
            thread_id = entry.thread_id,
            chapter_id = entry.chapter_id,
            "chapter indexed"
        );
        Ok(id)
    }

    /// Chapters of `thread_id` most similar to `query_text`.
    pub async fn query(
        &self,
        thread_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        let filter = ThreadFilter::new(thread_id)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.ensure().await?;
        let vector = self.embedder.embed(query_text).await?;
        self.index
            .query(&self.namespace, &vector, top_k, &filter)
            .await
    }

    /// The "relevant prior chapters" note for the system prompt, or `None`
    /// when the thread has nothing indexed yet.
    pub async fn memory_note(
        &self,
        thread_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Option<String>, MemoryError> {
        let matches = self.query(thread_id, query_text, top_k).await?;
        Ok(format_memory_note(&matches))
    }
}

/// Render retrieval hits as a prompt note.
pub fn format_memory_note(matches: &[MemoryMatch]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let mut note = String::from("Relevant prior chapters");
    for m in matches {
        let label = if m.metadata.title.trim().is_empty() {
            m.metadata.chapter_id.as_str()
        } else {
            m.metadata.title.as_str()
        };
        note.push_str("\n- ");
        note.push_str(label);
        note.push_str(": ");
        note.push_str(clip(&m.metadata.summary, NOTE_SUMMARY_CHARS));
    }
    Some(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HashEmbedder;

    fn memory() -> ChapterMemory {
        ChapterMemory::new(
            Arc::new(HashEmbedder::new(64)),
            Arc::new(InMemoryVectorIndex::new()),
        )
    }

    fn entry<'a>(thread: &'a str, chapter: &'a str, summary: &'a str) -> ChapterMemoryEntry<'a> {
        ChapterMemoryEntry {
            thread_id: thread,
            chapter_id: chapter,
            title: chapter,
            summary,
            memo: None,
        }
    }

    #[test]
    fn test_embedding_text() {
        assert_eq!(embedding_text("S", None), "S");
        assert_eq!(embedding_text("S", Some("  ")), "S");
        assert_eq!(embedding_text("S", Some("M")), "S\n\nMemo: M");
    }

    #[tokio::test]
    async fn test_index_uses_thread_chapter_id() {
        let memory = memory();
        let id = memory
            .index_chapter(entry("t1", "c1", "The grove burns."))
            .await
            .unwrap();
        assert_eq!(id, "t1:c1");
    }

    #[tokio::test]
    async fn test_query_is_scoped_to_thread() {
        let memory = memory();
        memory
            .index_chapter(entry("A", "a1", "Shadowheart guards the silver artefact."))
            .await
            .unwrap();
        memory
            .index_chapter(entry("B", "b1", "Shadowheart guards the silver artefact."))
            .await
            .unwrap();

        let hits = memory
            .query("A", "Shadowheart artefact", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.metadata.thread_id == "A"));
    }

    #[tokio::test]
    async fn test_query_requires_thread() {
        let memory = memory();
        assert!(matches!(
            memory.query("  ", "anything", 3).await,
            Err(MemoryError::MissingThread)
        ));
        assert!(matches!(
            memory.index_chapter(entry("", "c", "s")).await,
            Err(MemoryError::MissingThread)
        ));
        assert!(matches!(
            memory.index_chapter(entry("t", "", "s")).await,
            Err(MemoryError::MissingChapter)
        ));
    }

    #[tokio::test]
    async fn test_reindexing_replaces_record() {
        let memory = memory();
        memory
            .index_chapter(entry("t", "c1", "first draft"))
            .await
            .unwrap();
        memory
            .index_chapter(entry("t", "c1", "second draft"))
            .await
            .unwrap();
        let hits = memory.query("t", "draft", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.summary, "second draft");
    }

    #[tokio::test]
    async fn test_memory_note_format() {
        let memory = memory();
        assert_eq!(memory.memory_note("t", "goblins", 3).await.unwrap(), None);

        let long = "x".repeat(500);
        memory
            .index_chapter(ChapterMemoryEntry {
                thread_id: "t",
                chapter_id: "c1",
                title: "The Goblin Camp",
                summary: &long,
                memo: Some("remember the drums"),
            })
            .await
            .unwrap();

        let note = memory.memory_note("t", "goblins", 3).await.unwrap().unwrap();
        assert!(note.starts_with("Relevant prior chapters\n- The Goblin Camp: "));
        assert_eq!(note.lines().nth(1).unwrap().len(), "- The Goblin Camp: ".len() + 200);
    }
}
