//! Document ingestion pipeline.
//!
//! extract -> chunk -> embed -> replace in the index, per document. Documents
//! run concurrently up to the configured limit; a failure in one document is
//! reported and never aborts the batch or touches other documents' chunks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::chunker::Chunker;
use crate::embeddings::EmbeddingService;
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, EmbeddedChunk};
use crate::{DocragError, Result};

/// What happened to a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    Ingested { chunks: usize },
    /// Fingerprint matched the indexed version; nothing was re-embedded.
    Skipped,
}

/// Batch summary returned by [`IngestionPipeline::ingest_path`].
#[derive(Debug, Default)]
pub struct IngestReport {
    /// (source name, chunk count) per freshly indexed document.
    pub ingested: Vec<(String, usize)>,
    pub skipped: Vec<String>,
    /// (source name, error message) per failed document.
    pub failed: Vec<(String, String)>,
}

impl IngestReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.ingested.len() + self.skipped.len() + self.failed.len()
    }

    /// Format the report for display
    #[must_use]
    pub fn format(&self) -> String {
        let mut output = format!(
            "Ingestion complete: {} ingested, {} skipped, {} failed\n",
            self.ingested.len(),
            self.skipped.len(),
            self.failed.len()
        );
        for (name, chunks) in &self.ingested {
            output.push_str(&format!("  + {name} ({chunks} chunks)\n"));
        }
        for name in &self.skipped {
            output.push_str(&format!("  = {name} (unchanged)\n"));
        }
        for (name, err) in &self.failed {
            output.push_str(&format!("  ! {name}: {err}\n"));
        }
        output
    }
}

/// Runs documents through chunking, embedding, and index replacement.
pub struct IngestionPipeline {
    chunker: Chunker,
    embeddings: Arc<EmbeddingService>,
    index: Arc<dyn VectorIndex>,
    concurrency: usize,
}

impl IngestionPipeline {
    #[must_use]
    pub fn new(
        chunker: Chunker,
        embeddings: Arc<EmbeddingService>,
        index: Arc<dyn VectorIndex>,
        concurrency: usize,
    ) -> Self {
        Self {
            chunker,
            embeddings,
            index,
            concurrency: concurrency.max(1),
        }
    }

    /// Ingest a single file or every supported file under a directory.
    pub async fn ingest_path(&self, path: &Path, force: bool) -> Result<IngestReport> {
        if path.is_dir() {
            return self.ingest_dir(path, force).await;
        }

        let name = source_name(path);
        let mut report = IngestReport::default();
        match self.ingest_file(path, None, force).await {
            Ok(DocumentOutcome::Ingested { chunks }) => report.ingested.push((name, chunks)),
            Ok(DocumentOutcome::Skipped) => report.skipped.push(name),
            Err(err) => {
                error!("Failed to ingest '{}': {}", name, err);
                report.failed.push((name, err.to_string()));
            }
        }
        Ok(report)
    }

    /// Ingest every supported file in `dir`. Files in an immediate
    /// subdirectory are tagged with the subdirectory name as their category.
    async fn ingest_dir(&self, dir: &Path, force: bool) -> Result<IngestReport> {
        let targets = collect_targets(dir)?;
        if targets.is_empty() {
            warn!("No supported documents found in {}", dir.display());
            return Ok(IngestReport::default());
        }
        info!(
            "Ingesting {} documents from {} (concurrency: {})",
            targets.len(),
            dir.display(),
            self.concurrency
        );

        let results = stream::iter(targets.into_iter().map(|(path, category)| async move {
            let name = source_name(&path);
            let outcome = self.ingest_file(&path, category.as_deref(), force).await;
            (name, outcome)
        }))
        .buffer_unordered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        let mut report = IngestReport::default();
        for (name, outcome) in results {
            match outcome {
                Ok(DocumentOutcome::Ingested { chunks }) => report.ingested.push((name, chunks)),
                Ok(DocumentOutcome::Skipped) => report.skipped.push(name),
                Err(err) => {
                    error!("Failed to ingest '{}': {}", name, err);
                    report.failed.push((name, err.to_string()));
                }
            }
        }
        report.ingested.sort();
        report.skipped.sort();
        report.failed.sort();
        Ok(report)
    }

    async fn ingest_file(
        &self,
        path: &Path,
        category: Option<&str>,
        force: bool,
    ) -> Result<DocumentOutcome> {
        let mut document = Document::from_file(path)?;
        if let Some(category) = category {
            document = document.with_category(category);
        }
        self.ingest_document(&document, force).await
    }

    /// Ingest one already-extracted document.
    pub async fn ingest_document(
        &self,
        document: &Document,
        force: bool,
    ) -> Result<DocumentOutcome> {
        let fingerprint = document.fingerprint();

        if !force {
            if let Some(existing) = self.index.document_fingerprint(&document.id).await? {
                if existing == fingerprint {
                    debug!("Document '{}' unchanged, skipping", document.id);
                    return Ok(DocumentOutcome::Skipped);
                }
            }
        }

        let spans = self.chunker.chunk(&document.text);
        if spans.is_empty() {
            return Err(DocragError::extraction(format!(
                "document '{}' produced no chunks",
                document.id
            )));
        }

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .map(|span| Chunk {
                document_id: document.id.clone(),
                source: document.source.clone(),
                seq: span.seq,
                text: span.text,
                category: document.category.clone(),
            })
            .collect();

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embeddings.generate_batch(texts).await?;

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect();

        self.index
            .replace_document(&document.id, &fingerprint, &embedded)
            .await?;

        info!("Ingested '{}': {} chunks", document.id, embedded.len());
        Ok(DocumentOutcome::Ingested {
            chunks: embedded.len(),
        })
    }
}

fn source_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// Supported files directly in `dir` plus one level of subdirectories,
/// sorted for a deterministic processing order.
fn collect_targets(dir: &Path) -> Result<Vec<(PathBuf, Option<String>)>> {
    let mut targets = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        DocragError::extraction(format!("cannot read directory {}: {e}", dir.display()))
    })?;

    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.is_file() && extract::is_supported(&path) {
            targets.push((path, None));
        } else if path.is_dir() {
            let category = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
            let nested = std::fs::read_dir(&path).map_err(|e| {
                DocragError::extraction(format!("cannot read directory {}: {e}", path.display()))
            })?;
            for nested_entry in nested.filter_map(std::result::Result::ok) {
                let nested_path = nested_entry.path();
                if nested_path.is_file() && extract::is_supported(&nested_path) {
                    targets.push((nested_path, category.clone()));
                }
            }
        }
    }

    targets.sort();
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::embeddings::EmbeddingBackend;
    use crate::index::{MemoryIndex, QueryFilter};

    const DIM: usize = 4;

    /// Deterministic backend: position `len % DIM` set to 1.0. Texts
    /// containing "poison" fail.
    struct TestBackend {
        calls: AtomicUsize,
    }

    impl TestBackend {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn vector_for(text: &str) -> Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(DocragError::embedding("provider rejected input"));
            }
            let mut v = vec![0.0; DIM];
            v[text.len() % DIM] = 1.0;
            Ok(v)
        }
    }

    #[async_trait]
    impl EmbeddingBackend for TestBackend {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Self::vector_for(text)
        }

        async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            texts.iter().map(|text| Self::vector_for(text)).collect()
        }
    }

    fn pipeline(index: Arc<MemoryIndex>) -> IngestionPipeline {
        let runtime = RuntimeConfig {
            retry_count: 0,
            ..RuntimeConfig::default()
        };
        let service = EmbeddingService::from_backend(
            Arc::new(TestBackend::new()),
            "test-model",
            DIM,
            &runtime,
        );
        IngestionPipeline::new(
            Chunker::new(40, 10).unwrap(),
            Arc::new(service),
            index,
            2,
        )
    }

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_ingest_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(dir.path(), "alpha.md", "Alpha document text. More words here.");
        write_file(dir.path(), "beta.txt", "Beta document text.");
        write_file(dir.path(), "ignored.pdf", "binary-ish");

        let index = Arc::new(MemoryIndex::new());
        let report = pipeline(index.clone()).ingest_path(dir.path(), false).await?;

        assert_eq!(report.ingested.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());
        assert!(index.chunk_count().await? > 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_reingest_skips_unchanged() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(dir.path(), "doc.md", "Stable content that does not change.");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = pipeline(index.clone());

        let first = pipeline.ingest_path(dir.path(), false).await?;
        assert_eq!(first.ingested.len(), 1);
        let count_after_first = index.chunk_count().await?;

        let second = pipeline.ingest_path(dir.path(), false).await?;
        assert!(second.ingested.is_empty());
        assert_eq!(second.skipped, vec!["doc.md".to_string()]);
        assert_eq!(index.chunk_count().await?, count_after_first);

        // Force bypasses the fingerprint comparison.
        let forced = pipeline.ingest_path(dir.path(), true).await?;
        assert_eq!(forced.ingested.len(), 1);
        assert_eq!(index.chunk_count().await?, count_after_first);
        Ok(())
    }

    #[tokio::test]
    async fn test_changed_document_replaces_old_chunks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(dir.path(), "doc.md", "First version of the text.");

        let index = Arc::new(MemoryIndex::new());
        let pipeline = pipeline(index.clone());
        pipeline.ingest_path(dir.path(), false).await?;
        let first_fingerprint = index.document_fingerprint("doc").await?;

        write_file(dir.path(), "doc.md", "Second version, now with different words.");
        let report = pipeline.ingest_path(dir.path(), false).await?;
        assert_eq!(report.ingested.len(), 1);
        assert_ne!(index.document_fingerprint("doc").await?, first_fingerprint);

        let results = index.query(&[1.0, 0.0, 0.0, 0.0], 10, &QueryFilter::default()).await?;
        assert!(results.iter().all(|r| r.chunk.text.contains("version")));
        assert!(results.iter().all(|r| !r.chunk.text.contains("First")));
        Ok(())
    }

    #[tokio::test]
    async fn test_one_failure_leaves_others_retrievable() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(dir.path(), "good-one.md", "Fine text.");
        write_file(dir.path(), "bad.md", "This chunk contains poison.");
        write_file(dir.path(), "good-two.md", "Also fine.");

        let index = Arc::new(MemoryIndex::new());
        let report = pipeline(index.clone()).ingest_path(dir.path(), false).await?;

        assert_eq!(report.ingested.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad.md");

        assert!(index.document_fingerprint("good-one").await?.is_some());
        assert!(index.document_fingerprint("good-two").await?.is_some());
        assert!(index.document_fingerprint("bad").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_subdirectory_becomes_category() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("policies"))?;
        write_file(&dir.path().join("policies"), "refunds.md", "Refunds take ten days.");

        let index = Arc::new(MemoryIndex::new());
        pipeline(index.clone()).ingest_path(dir.path(), false).await?;

        let filter = QueryFilter {
            category: Some("policies".to_string()),
            document_id: None,
        };
        let results = index.query(&[1.0, 0.0, 0.0, 0.0], 10, &filter).await?;
        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.category.as_deref(), Some("policies"));
        Ok(())
    }

    #[tokio::test]
    async fn test_report_format_lists_outcomes() {
        let report = IngestReport {
            ingested: vec![("a.md".to_string(), 3)],
            skipped: vec!["b.md".to_string()],
            failed: vec![("c.md".to_string(), "Embedding error: boom".to_string())],
        };
        let text = report.format();
        assert!(text.contains("1 ingested, 1 skipped, 1 failed"));
        assert!(text.contains("a.md (3 chunks)"));
        assert!(text.contains("b.md (unchanged)"));
        assert!(text.contains("c.md: Embedding error: boom"));
        assert_eq!(report.total(), 3);
    }
}
