//! Embedding service with per-call timeouts, retries and batch splitting

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::client::EmbeddingClient;
use super::EmbeddingBackend;
use super::MAX_BATCH_SIZE;
use crate::errors::DocragError;
use crate::errors::Result;

/// Wraps an [`EmbeddingBackend`] with the crate's boundary-call policy:
/// every call runs under a timeout, transient failures get retried with
/// backoff, and every returned vector is checked against the configured
/// dimension. A mismatched dimension means the deployed model does not
/// match the index and is fatal rather than retryable.
pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    model: String,
    dimension: usize,
    retry_count: u32,
    backoff_ms: u64,
    timeout: Duration,
}

impl EmbeddingService {
    /// Create a new embedding service backed by the configured HTTP provider
    pub fn new(config: &crate::config::AppConfig) -> Result<Self> {
        let client = EmbeddingClient::new(&config.embeddings)?;

        Ok(Self {
            backend: Arc::new(client),
            model: config.embeddings.model.clone(),
            dimension: config.embedding_dimension(),
            retry_count: config.retry_count(),
            backoff_ms: config.backoff_ms(),
            timeout: Duration::from_secs(config.timeout_secs()),
        })
    }

    /// Create a service over any backend (used by tests and local mode)
    pub fn from_backend(
        backend: Arc<dyn EmbeddingBackend>,
        model: impl Into<String>,
        dimension: usize,
        runtime: &crate::config::RuntimeConfig,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            dimension,
            retry_count: runtime.retry_count,
            backoff_ms: runtime.backoff_ms,
            timeout: Duration::from_secs(runtime.timeout_secs),
        }
    }

    /// Generate embedding for a single text
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let attempts = self.retry_count + 1;
        let mut attempt = 1u32;
        loop {
            let err = match tokio::time::timeout(self.timeout, self.backend.embed(text)).await {
                Ok(Ok(embedding)) => return self.check_dimension(embedding),
                Ok(Err(e)) => e,
                Err(_) => DocragError::embedding(format!(
                    "embedding call timed out after {}s",
                    self.timeout.as_secs()
                )),
            };

            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            warn!(
                "Attempt {}/{}: embedding call failed: {}",
                attempt, attempts, err
            );
            tokio::time::sleep(Duration::from_millis(self.backoff_ms * u64::from(attempt))).await;
            attempt += 1;
        }
    }

    /// Generate embeddings for multiple texts, preserving order.
    ///
    /// Blank texts never reach the provider; they come back as zero vectors
    /// in their original positions. Larger batches are split at
    /// [`MAX_BATCH_SIZE`].
    pub async fn generate_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut kept = Vec::new();
        let mut blank_at = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                blank_at.push(i);
            } else {
                kept.push(*text);
            }
        }

        let mut embeddings = Vec::with_capacity(kept.len());
        for batch in kept.chunks(MAX_BATCH_SIZE) {
            embeddings.extend(self.call_batch(batch).await?);
        }

        // Re-insert zero vectors at their original positions, ascending so
        // each insertion shifts only what comes after it
        let zeros = vec![0.0; self.dimension];
        for &i in &blank_at {
            embeddings.insert(i, zeros.clone());
        }

        Ok(embeddings)
    }

    async fn call_batch(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        let attempts = self.retry_count + 1;
        let mut attempt = 1u32;
        loop {
            let call = self.backend.embed_batch(batch.to_vec());
            let err = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(embeddings)) => {
                    let mut checked = Vec::with_capacity(embeddings.len());
                    for embedding in embeddings {
                        checked.push(self.check_dimension(embedding)?);
                    }
                    return Ok(checked);
                }
                Ok(Err(e)) => e,
                Err(_) => DocragError::embedding(format!(
                    "batch embedding call timed out after {}s",
                    self.timeout.as_secs()
                )),
            };

            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            warn!(
                "Attempt {}/{}: batch embedding call failed: {}",
                attempt, attempts, err
            );
            tokio::time::sleep(Duration::from_millis(self.backoff_ms * u64::from(attempt))).await;
            attempt += 1;
        }
    }

    fn check_dimension(&self, embedding: Vec<f32>) -> Result<Vec<f32>> {
        if embedding.len() == self.dimension {
            Ok(embedding)
        } else {
            Err(DocragError::config(format!(
                "embedding dimension mismatch: model \"{}\" returned {}, configured {}",
                self.model,
                embedding.len(),
                self.dimension
            )))
        }
    }

    /// Vector width the service enforces on every result.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Model identifier, as reported in errors and status output.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}
