//! Postgres pool wrapper and schema bootstrap.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::Result;

/// Shared handle to the connection pool. Cloning is cheap; every clone
/// talks to the same pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool sized from the `[database]` config section.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(Duration::from_secs(config.connection_timeout()))
            .connect(config.database_url())
            .await?;

        tracing::info!(
            "Database pool ready ({}..{} connections)",
            config.min_connections(),
            config.max_connections()
        );

        Ok(Self::new(pool))
    }

    /// Create the pgvector extension plus the chunk and conversation tables.
    /// Idempotent; safe to run on every startup.
    pub async fn init_schema(&self, embedding_dimension: usize) -> Result<()> {
        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                r"CREATE TABLE IF NOT EXISTS doc_chunks (
                    id UUID PRIMARY KEY,
                    document_id TEXT NOT NULL,
                    source TEXT NOT NULL,
                    seq BIGINT NOT NULL,
                    text TEXT NOT NULL,
                    category TEXT,
                    fingerprint TEXT NOT NULL,
                    embedding vector({embedding_dimension}) NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
                )"
            ),
            "CREATE INDEX IF NOT EXISTS idx_doc_chunks_document_id \
             ON doc_chunks(document_id)"
                .to_string(),
            r"CREATE INDEX IF NOT EXISTS idx_doc_chunks_embedding
              ON doc_chunks USING ivfflat (embedding vector_cosine_ops)
              WITH (lists = 100)"
                .to_string(),
            r"CREATE TABLE IF NOT EXISTS conversation_turns (
                  id BIGSERIAL PRIMARY KEY,
                  session_id TEXT NOT NULL,
                  role TEXT NOT NULL,
                  content TEXT NOT NULL,
                  citations JSONB,
                  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
              )"
            .to_string(),
            r"CREATE INDEX IF NOT EXISTS idx_conversation_turns_session
              ON conversation_turns(session_id, id)"
                .to_string(),
        ];

        for sql in &statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }

        tracing::info!("Schema ready (embedding dimension: {})", embedding_dimension);
        Ok(())
    }

    /// Cheap connectivity probe for status reporting
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for components issuing their own queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}
