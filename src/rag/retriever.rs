//! Query-time retrieval against the vector index

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::config::AppConfig;
use crate::embeddings::EmbeddingService;
use crate::errors::DocragError;
use crate::errors::Result;
use crate::index::QueryFilter;
use crate::index::VectorIndex;
use crate::models::ScoredChunk;

/// Embeds a question and fetches the most similar chunks.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embeddings: Arc<EmbeddingService>,
    top_k: usize,
    similarity_floor: f32,
    retry_count: u32,
    backoff_ms: u64,
    timeout: Duration,
}

impl Retriever {
    /// Create a new retriever
    pub fn new(
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            index,
            embeddings,
            top_k: config.top_k(),
            similarity_floor: config.similarity_floor(),
            retry_count: config.retry_count(),
            backoff_ms: config.backoff_ms(),
            timeout: Duration::from_secs(config.timeout_secs()),
        }
    }

    /// Top-k chunks for a question, best first, with everything below the
    /// similarity floor dropped. An unavailable index is retried before the
    /// request fails.
    pub async fn retrieve(&self, question: &str, filter: &QueryFilter) -> Result<Vec<ScoredChunk>> {
        debug!("Embedding query");
        let embedding = self.embeddings.generate(question).await?;

        let mut results = self.query_index(&embedding, filter).await?;
        let candidates = results.len();
        results.retain(|scored| scored.similarity >= self.similarity_floor);
        debug!(
            "Retrieved {} candidates, {} above similarity floor {}",
            candidates,
            results.len(),
            self.similarity_floor
        );
        Ok(results)
    }

    async fn query_index(
        &self,
        embedding: &[f32],
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let attempts = self.retry_count + 1;
        let mut attempt = 1u32;
        loop {
            let err = match tokio::time::timeout(
                self.timeout,
                self.index.query(embedding, self.top_k, filter),
            )
            .await
            {
                Ok(Ok(results)) => return Ok(results),
                Ok(Err(e)) => e,
                Err(_) => DocragError::index_unavailable(format!(
                    "vector query timed out after {}s",
                    self.timeout.as_secs()
                )),
            };

            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            warn!(
                "Attempt {}/{}: vector query failed: {}",
                attempt, attempts, err
            );
            tokio::time::sleep(Duration::from_millis(self.backoff_ms * u64::from(attempt))).await;
            attempt += 1;
        }
    }
}
