//! Postgres/pgvector index backend.

use pgvector::Vector;

use super::{QueryFilter, VectorIndex};
use crate::database::Database;
use crate::models::{Chunk, EmbeddedChunk, ScoredChunk};
use crate::{DocragError, Result};

/// Vector index stored in the `doc_chunks` table.
#[derive(Debug, Clone)]
pub struct PgVectorIndex {
    db: Database,
}

/// Classify pool and connection failures as transient so callers retry
/// them; anything else is a real database error.
fn index_err(err: sqlx::Error) -> DocragError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            DocragError::index_unavailable(err.to_string())
        }
        other => DocragError::Database(other),
    }
}

#[derive(sqlx::FromRow)]
struct RawResult {
    document_id: String,
    source: String,
    seq: i64,
    text: String,
    category: Option<String>,
    similarity: f64,
}

impl PgVectorIndex {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl VectorIndex for PgVectorIndex {
    async fn replace_document(
        &self,
        document_id: &str,
        fingerprint: &str,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await.map_err(index_err)?;

        sqlx::query("DELETE FROM doc_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

        for embedded in chunks {
            sqlx::query(
                r"
                INSERT INTO doc_chunks
                    (id, document_id, source, seq, text, category, fingerprint, embedding)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(uuid::Uuid::new_v4())
            .bind(&embedded.chunk.document_id)
            .bind(&embedded.chunk.source)
            .bind(embedded.chunk.seq as i64)
            .bind(&embedded.chunk.text)
            .bind(embedded.chunk.category.as_deref())
            .bind(fingerprint)
            .bind(Vector::from(embedded.embedding.clone()))
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }

        tx.commit().await.map_err(index_err)?;

        tracing::debug!(
            "Replaced document '{}' with {} chunks",
            document_id,
            chunks.len()
        );
        Ok(())
    }

    async fn remove_document(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM doc_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(self.db.pool())
            .await
            .map_err(index_err)?;
        Ok(result.rows_affected())
    }

    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = Vector::from(embedding.to_vec());

        let rows: Vec<RawResult> = sqlx::query_as(
            r"
            SELECT document_id, source, seq, text, category,
                   1 - (embedding <=> $1::vector) as similarity
            FROM doc_chunks
            WHERE ($2::text IS NULL OR category = $2)
              AND ($3::text IS NULL OR document_id = $3)
            ORDER BY embedding <=> $1::vector, seq
            LIMIT $4
            ",
        )
        .bind(&vector)
        .bind(filter.category.as_deref())
        .bind(filter.document_id.as_deref())
        .bind(top_k as i64)
        .fetch_all(self.db.pool())
        .await
        .map_err(index_err)?;

        Ok(rows
            .into_iter()
            .map(|row| ScoredChunk {
                chunk: Chunk {
                    document_id: row.document_id,
                    source: row.source,
                    seq: row.seq as usize,
                    text: row.text,
                    category: row.category,
                },
                similarity: row.similarity as f32,
            })
            .collect())
    }

    async fn document_fingerprint(&self, document_id: &str) -> Result<Option<String>> {
        let fingerprint: Option<String> =
            sqlx::query_scalar("SELECT fingerprint FROM doc_chunks WHERE document_id = $1 LIMIT 1")
                .bind(document_id)
                .fetch_optional(self.db.pool())
                .await
                .map_err(index_err)?;
        Ok(fingerprint)
    }

    async fn chunk_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM doc_chunks")
            .fetch_one(self.db.pool())
            .await
            .map_err(index_err)?;
        Ok(count)
    }
}
