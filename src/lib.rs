pub mod chunker;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod errors;
pub mod eval;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod models;
pub mod rag;

pub use config::AppConfig;
pub use errors::*;
pub use models::{Answer, ChatResponse, Chunk, Citation, Document, EmbeddedChunk, ScoredChunk};
