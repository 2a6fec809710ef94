//! In-process vector index.
//!
//! Backs tests and the evaluation harness; no persistence. Ranking follows
//! the same cosine ordering as the Postgres backend so results are
//! comparable across the two.

use std::cmp::Ordering;

use tokio::sync::RwLock;

use super::{QueryFilter, VectorIndex};
use crate::models::{EmbeddedChunk, ScoredChunk};
use crate::Result;

struct StoredChunk {
    fingerprint: String,
    embedded: EmbeddedChunk,
}

/// Vector index held entirely in memory.
#[derive(Default)]
pub struct MemoryIndex {
    store: RwLock<Vec<StoredChunk>>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait::async_trait]
impl VectorIndex for MemoryIndex {
    async fn replace_document(
        &self,
        document_id: &str,
        fingerprint: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut store = self.store.write().await;
        store.retain(|stored| stored.embedded.chunk.document_id != document_id);
        store.extend(chunks.iter().map(|embedded| StoredChunk {
            fingerprint: fingerprint.to_string(),
            embedded: embedded.clone(),
        }));
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<u64> {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|stored| stored.embedded.chunk.document_id != document_id);
        Ok((before - store.len()) as u64)
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let store = self.store.read().await;
        let mut results: Vec<ScoredChunk> = store
            .iter()
            .filter(|stored| filter.matches(&stored.embedded.chunk))
            .map(|stored| ScoredChunk {
                chunk: stored.embedded.chunk.clone(),
                similarity: cosine_sim(embedding, &stored.embedded.embedding),
            })
            .collect();
        // Stable sort keeps insertion order for equal scores.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn document_fingerprint(&self, document_id: &str) -> Result<Option<String>> {
        let store = self.store.read().await;
        Ok(store
            .iter()
            .find(|stored| stored.embedded.chunk.document_id == document_id)
            .map(|stored| stored.fingerprint.clone()))
    }

    async fn chunk_count(&self) -> Result<i64> {
        let store = self.store.read().await;
        Ok(store.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn embedded(document_id: &str, seq: usize, text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                document_id: document_id.to_string(),
                source: format!("{document_id}.md"),
                seq,
                text: text.to_string(),
                category: None,
            },
            embedding,
        }
    }

    #[test]
    fn test_cosine_sim_basics() {
        assert!((cosine_sim(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_sim(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_sim(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Zero vectors score zero instead of dividing by zero.
        assert_eq!(cosine_sim(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() -> crate::Result<()> {
        let index = MemoryIndex::new();
        index
            .replace_document(
                "doc",
                "fp",
                &[
                    embedded("doc", 0, "east", vec![1.0, 0.0]),
                    embedded("doc", 1, "north", vec![0.0, 1.0]),
                    embedded("doc", 2, "northeast", vec![0.7, 0.7]),
                ],
            )
            .await?;

        let results = index
            .query(&[1.0, 0.1], 2, &QueryFilter::default())
            .await?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.text, "east");
        assert_eq!(results[1].chunk.text, "northeast");
        assert!(results[0].similarity > results[1].similarity);
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_supersedes_previous_version() -> crate::Result<()> {
        let index = MemoryIndex::new();
        index
            .replace_document(
                "doc",
                "fp-v1",
                &[
                    embedded("doc", 0, "old a", vec![1.0, 0.0]),
                    embedded("doc", 1, "old b", vec![0.0, 1.0]),
                ],
            )
            .await?;
        index
            .replace_document("doc", "fp-v2", &[embedded("doc", 0, "new", vec![1.0, 0.0])])
            .await?;

        assert_eq!(index.chunk_count().await?, 1);
        assert_eq!(
            index.document_fingerprint("doc").await?,
            Some("fp-v2".to_string())
        );
        let results = index
            .query(&[1.0, 0.0], 10, &QueryFilter::default())
            .await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "new");
        Ok(())
    }

    #[tokio::test]
    async fn test_query_respects_category_filter() -> crate::Result<()> {
        let index = MemoryIndex::new();
        let mut tagged = embedded("a", 0, "tagged", vec![1.0, 0.0]);
        tagged.chunk.category = Some("policies".to_string());
        index.replace_document("a", "fp-a", &[tagged]).await?;
        index
            .replace_document("b", "fp-b", &[embedded("b", 0, "untagged", vec![1.0, 0.0])])
            .await?;

        let filter = QueryFilter {
            category: Some("policies".to_string()),
            document_id: None,
        };
        let results = index.query(&[1.0, 0.0], 10, &filter).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "tagged");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_results() -> crate::Result<()> {
        let index = MemoryIndex::new();
        let results = index
            .query(&[1.0, 0.0], 5, &QueryFilter::default())
            .await?;
        assert!(results.is_empty());
        assert_eq!(index.chunk_count().await?, 0);
        assert_eq!(index.document_fingerprint("missing").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_document_reports_count() -> crate::Result<()> {
        let index = MemoryIndex::new();
        index
            .replace_document(
                "doc",
                "fp",
                &[
                    embedded("doc", 0, "a", vec![1.0, 0.0]),
                    embedded("doc", 1, "b", vec![0.0, 1.0]),
                ],
            )
            .await?;
        assert_eq!(index.remove_document("doc").await?, 2);
        assert_eq!(index.remove_document("doc").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() -> crate::Result<()> {
        let index = MemoryIndex::new();
        index
            .replace_document(
                "doc",
                "fp",
                &[
                    embedded("doc", 0, "first", vec![1.0, 0.0]),
                    embedded("doc", 1, "second", vec![1.0, 0.0]),
                ],
            )
            .await?;
        let results = index
            .query(&[1.0, 0.0], 2, &QueryFilter::default())
            .await?;
        assert_eq!(results[0].chunk.text, "first");
        assert_eq!(results[1].chunk.text, "second");
        Ok(())
    }
}
