//! In-process vector index.

use super::{MemoryError, MemoryMatch, MemoryRecord, ThreadFilter, VectorIndex};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Namespace {
    dimension: usize,
    records: HashMap<String, MemoryRecord>,
}

/// A [`VectorIndex`] kept in memory. Brute-force cosine similarity.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `namespace`.
    pub async fn len(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .await
            .get(namespace)
            .map(|ns| ns.records.len())
            .unwrap_or(0)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_namespace(&self, namespace: &str, dimension: usize) -> Result<(), MemoryError> {
        let mut namespaces = self.namespaces.write().await;
        match namespaces.get(namespace) {
            Some(existing) if existing.dimension != dimension => {
                Err(MemoryError::DimensionMismatch {
                    expected: existing.dimension,
                    found: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::debug!(namespace, dimension, "creating vector namespace");
                namespaces.insert(
                    namespace.to_string(),
                    Namespace {
                        dimension,
                        records: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(&self, namespace: &str, record: MemoryRecord) -> Result<(), MemoryError> {
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| MemoryError::MissingNamespace(namespace.to_string()))?;
        if record.vector.len() != ns.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: ns.dimension,
                found: record.vector.len(),
            });
        }
        ns.records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filter: &ThreadFilter,
    ) -> Result<Vec<MemoryMatch>, MemoryError> {
        let namespaces = self.namespaces.read().await;
        let ns = namespaces
            .get(namespace)
            .ok_or_else(|| MemoryError::MissingNamespace(namespace.to_string()))?;
        if vector.len() != ns.dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: ns.dimension,
                found: vector.len(),
            });
        }

        let mut matches: Vec<MemoryMatch> = ns
            .records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .map(|r| MemoryMatch {
                id: r.id.clone(),
                score: cosine(vector, &r.vector),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(top_k);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ChapterMetadata;

    fn record(thread: &str, chapter: &str, vector: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: format!("{thread}:{chapter}"),
            vector,
            metadata: ChapterMetadata {
                thread_id: thread.into(),
                chapter_id: chapter.into(),
                title: String::new(),
                summary: String::new(),
            },
        }
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent_and_checks_dimension() {
        let index = InMemoryVectorIndex::new();
        index.ensure_namespace("ns", 2).await.unwrap();
        index.upsert("ns", record("t", "c", vec![1.0, 0.0])).await.unwrap();
        index.ensure_namespace("ns", 2).await.unwrap();
        assert_eq!(index.len("ns").await, 1);

        assert!(matches!(
            index.ensure_namespace("ns", 3).await,
            Err(MemoryError::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[tokio::test]
    async fn test_upsert_requires_namespace_and_dimension() {
        let index = InMemoryVectorIndex::new();
        assert!(matches!(
            index.upsert("nope", record("t", "c", vec![1.0])).await,
            Err(MemoryError::MissingNamespace(_))
        ));
        index.ensure_namespace("ns", 2).await.unwrap();
        assert!(index
            .upsert("ns", record("t", "c", vec![1.0, 2.0, 3.0]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_query_ranks_and_filters() {
        let index = InMemoryVectorIndex::new();
        index.ensure_namespace("ns", 2).await.unwrap();
        index.upsert("ns", record("t", "near", vec![1.0, 0.1])).await.unwrap();
        index.upsert("ns", record("t", "far", vec![0.0, 1.0])).await.unwrap();
        index.upsert("ns", record("other", "x", vec![1.0, 0.0])).await.unwrap();

        let filter = ThreadFilter::new("t").unwrap();
        let hits = index.query("ns", &[1.0, 0.0], 5, &filter).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["t:near", "t:far"]);

        let top1 = index.query("ns", &[1.0, 0.0], 1, &filter).await.unwrap();
        assert_eq!(top1.len(), 1);
    }
}
