//! Text embedding boundary.
//!
//! A provider-agnostic [`EmbeddingBackend`] trait, an HTTP client covering
//! `OpenAI`-compatible and Ollama endpoints, and [`EmbeddingService`], the
//! wrapper every caller goes through: it owns retries, per-call timeouts,
//! batch splitting, and the fatal dimension check. Ingestion and query
//! embeddings must come from the same service so both sides of a similarity
//! comparison share one vector space.

pub mod client;
pub mod service;

use async_trait::async_trait;

pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;
pub use service::EmbeddingService;

use crate::errors::Result;

/// Maximum batch size for embedding generation
pub const MAX_BATCH_SIZE: usize = 100;

/// Anything that can turn text into a fixed-dimension vector. The HTTP
/// client is the production implementation; tests plug in deterministic
/// fakes.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving order.
    async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>>;
}
