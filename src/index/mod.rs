//! Vector index backends.
//!
//! The pipeline talks to storage through the [`VectorIndex`] trait so the
//! same retrieval code runs against Postgres/pgvector in production and an
//! in-process store in tests.

pub mod memory;
pub mod postgres;

pub use memory::MemoryIndex;
pub use postgres::PgVectorIndex;

use async_trait::async_trait;

use crate::models::{Chunk, EmbeddedChunk, ScoredChunk};
use crate::Result;

/// Optional metadata constraints applied to a similarity query.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub category: Option<String>,
    pub document_id: Option<String>,
}

impl QueryFilter {
    #[must_use]
    pub fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(category) = &self.category {
            if chunk.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(document_id) = &self.document_id {
            if chunk.document_id != *document_id {
                return false;
            }
        }
        true
    }
}

/// Storage boundary for embedded chunks.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every chunk of `document_id` with `chunks` in one atomic step.
    /// Queries running concurrently see either the old version or the new
    /// one, never a mix.
    async fn replace_document(
        &self,
        document_id: &str,
        fingerprint: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()>;

    /// Remove every chunk of `document_id`. Returns the number removed.
    async fn remove_document(&self, document_id: &str) -> Result<u64>;

    /// Top-k nearest chunks by cosine similarity, best first. Ties keep
    /// insertion order.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredChunk>>;

    /// Fingerprint recorded for `document_id`, if the document is indexed.
    async fn document_fingerprint(&self, document_id: &str) -> Result<Option<String>>;

    /// Total number of chunks in the index.
    async fn chunk_count(&self) -> Result<i64>;
}
