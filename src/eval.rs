//! Evaluation harness: golden questions scored against the live pipeline.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::rag::RagService;
use crate::{DocragError, Result};

/// One golden question with its expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenCase {
    pub question: String,
    /// Keywords the answer should contain, matched case-insensitively.
    pub expected_keywords: Vec<String>,
    /// Source file name expected among the citations.
    pub expected_source: String,
}

/// Scores for a single golden case.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub question: String,
    pub keyword_score: f32,
    pub source_hit: bool,
    pub grounded: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Aggregate scores over a golden set.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub cases: Vec<CaseResult>,
    pub keyword_score: f32,
    pub source_accuracy: f32,
    pub grounding_rate: f32,
    pub avg_latency_ms: u64,
}

impl EvalReport {
    fn from_cases(cases: Vec<CaseResult>) -> Self {
        let total = cases.len();
        if total == 0 {
            return Self {
                cases,
                keyword_score: 0.0,
                source_accuracy: 0.0,
                grounding_rate: 0.0,
                avg_latency_ms: 0,
            };
        }

        let keyword_score = cases.iter().map(|c| c.keyword_score).sum::<f32>() / total as f32;
        let source_accuracy = cases.iter().filter(|c| c.source_hit).count() as f32 / total as f32;
        let grounding_rate = cases.iter().filter(|c| c.grounded).count() as f32 / total as f32;
        // Failed cases score zero but never skew the latency average.
        let completed: Vec<&CaseResult> = cases.iter().filter(|c| c.error.is_none()).collect();
        let avg_latency_ms = if completed.is_empty() {
            0
        } else {
            completed.iter().map(|c| c.latency_ms).sum::<u64>() / completed.len() as u64
        };

        Self {
            cases,
            keyword_score,
            source_accuracy,
            grounding_rate,
            avg_latency_ms,
        }
    }

    /// Format the report for display
    #[must_use]
    pub fn format(&self) -> String {
        let mut output = format!("Evaluation over {} case(s)\n", self.cases.len());
        output.push_str(&format!("  Keyword score:   {:.2}\n", self.keyword_score));
        output.push_str(&format!(
            "  Source accuracy: {:.1}%\n",
            self.source_accuracy * 100.0
        ));
        output.push_str(&format!(
            "  Grounding rate:  {:.1}%\n",
            self.grounding_rate * 100.0
        ));
        output.push_str(&format!("  Avg latency:     {}ms\n\n", self.avg_latency_ms));

        for (idx, case) in self.cases.iter().enumerate() {
            match &case.error {
                Some(err) => {
                    output.push_str(&format!("  {}. FAILED: {} ({})\n", idx + 1, case.question, err));
                }
                None => {
                    output.push_str(&format!(
                        "  {}. kw {:.2} | source {} | grounded {} | {}ms | {}\n",
                        idx + 1,
                        case.keyword_score,
                        if case.source_hit { "hit" } else { "miss" },
                        if case.grounded { "yes" } else { "no" },
                        case.latency_ms,
                        case.question
                    ));
                }
            }
        }
        output
    }
}

/// Runs golden cases through a [`RagService`] under throwaway sessions.
pub struct EvalHarness {
    service: Arc<RagService>,
}

impl EvalHarness {
    #[must_use]
    pub fn new(service: Arc<RagService>) -> Self {
        Self { service }
    }

    /// Load golden cases from a JSON file.
    ///
    /// # Errors
    /// - `Io` when the file cannot be read
    /// - `Serialization` for malformed JSON
    /// - `ValidationError` when the set is empty
    pub fn load_cases(path: &Path) -> Result<Vec<GoldenCase>> {
        let raw = std::fs::read_to_string(path)?;
        let cases: Vec<GoldenCase> = serde_json::from_str(&raw)?;
        if cases.is_empty() {
            return Err(DocragError::validation(format!(
                "golden set {} contains no cases",
                path.display()
            )));
        }
        Ok(cases)
    }

    /// Run every case and aggregate the scores. A failing case is recorded
    /// with zero scores instead of aborting the run.
    pub async fn run(&self, cases: &[GoldenCase]) -> EvalReport {
        let mut results = Vec::with_capacity(cases.len());
        for (idx, case) in cases.iter().enumerate() {
            info!(
                "Evaluating case {}/{}: {}",
                idx + 1,
                cases.len(),
                case.question
            );
            let session_id = format!("eval-{}", Uuid::new_v4());

            let result = match self.service.ask(&case.question, &session_id).await {
                Ok(response) => CaseResult {
                    question: case.question.clone(),
                    keyword_score: keyword_score(&response.answer, &case.expected_keywords),
                    source_hit: response
                        .citations
                        .iter()
                        .any(|citation| citation.source == case.expected_source),
                    grounded: response.grounded,
                    latency_ms: response.latency_ms,
                    error: None,
                },
                Err(err) => {
                    warn!("Case '{}' failed: {}", case.question, err);
                    CaseResult {
                        question: case.question.clone(),
                        keyword_score: 0.0,
                        source_hit: false,
                        grounded: false,
                        latency_ms: 0,
                        error: Some(err.to_string()),
                    }
                }
            };

            self.service.forget_session(&session_id);
            results.push(result);
        }
        EvalReport::from_cases(results)
    }
}

/// Fraction of expected keywords present in the answer, case-insensitive.
fn keyword_score(answer: &str, expected: &[String]) -> f32 {
    if expected.is_empty() {
        return 1.0;
    }
    let answer = answer.to_lowercase();
    let hits = expected
        .iter()
        .filter(|keyword| answer.contains(&keyword.to_lowercase()))
        .count();
    hits as f32 / expected.len() as f32
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::AppConfig;
    use crate::embeddings::EmbeddingBackend;
    use crate::embeddings::EmbeddingService;
    use crate::index::MemoryIndex;
    use crate::index::VectorIndex;
    use crate::llm::LlmBackend;
    use crate::llm::LlmService;
    use crate::memory::ConversationMemory;
    use crate::models::Chunk;
    use crate::models::EmbeddedChunk;

    #[test]
    fn test_keyword_score() {
        let expected = vec!["refund".to_string(), "Ten Days".to_string()];
        assert!((keyword_score("Refunds take ten days.", &expected) - 1.0).abs() < 1e-6);
        assert!((keyword_score("Refunds exist.", &expected) - 0.5).abs() < 1e-6);
        assert!((keyword_score("No idea.", &expected) - 0.0).abs() < 1e-6);
        assert!((keyword_score("Anything.", &[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_cases_rejects_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden_set.json");
        std::fs::write(&path, "[]").unwrap();
        let err = EvalHarness::load_cases(&path).unwrap_err();
        assert!(matches!(err, DocragError::Validation(_)));
    }

    #[test]
    fn test_load_cases_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden_set.json");
        std::fs::write(
            &path,
            r#"[{"question": "Q?", "expected_keywords": ["a"], "expected_source": "doc.md"}]"#,
        )
        .unwrap();
        let cases = EvalHarness::load_cases(&path).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_source, "doc.md");
    }

    struct UnitBackend;

    #[async_trait]
    impl EmbeddingBackend for UnitBackend {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct ScriptedLlm;

    #[async_trait]
    impl LlmBackend for ScriptedLlm {
        async fn generate(&self, _: &str, _: f32, _: u32) -> Result<String> {
            Ok("Refunds are processed within ten business days [S1].".to_string())
        }
    }

    async fn harness() -> EvalHarness {
        let config = AppConfig::default();
        let index = Arc::new(MemoryIndex::new());
        index
            .replace_document(
                "refund-policy",
                "fp",
                &[EmbeddedChunk {
                    chunk: Chunk {
                        document_id: "refund-policy".to_string(),
                        source: "refund-policy.md".to_string(),
                        seq: 0,
                        text: "Refunds are processed within ten business days.".to_string(),
                        category: None,
                    },
                    embedding: vec![1.0, 0.0],
                }],
            )
            .await
            .unwrap();

        let embeddings = Arc::new(EmbeddingService::from_backend(
            Arc::new(UnitBackend),
            "test-embed",
            2,
            &config.runtime,
        ));
        let llm =
            LlmService::from_backend(Arc::new(ScriptedLlm), "test-llm", 0.2, 100, &config.runtime);
        let memory = Arc::new(ConversationMemory::ephemeral(config.memory_window()));
        EvalHarness::new(Arc::new(RagService::from_parts(
            index, embeddings, llm, memory, &config,
        )))
    }

    #[tokio::test]
    async fn test_run_scores_cases() {
        let harness = harness().await;
        let cases = vec![
            GoldenCase {
                question: "How long do refunds take?".to_string(),
                expected_keywords: vec!["ten".to_string(), "days".to_string()],
                expected_source: "refund-policy.md".to_string(),
            },
            GoldenCase {
                question: "What about shipping?".to_string(),
                expected_keywords: vec!["overnight".to_string()],
                expected_source: "shipping.md".to_string(),
            },
        ];

        let report = harness.run(&cases).await;
        assert_eq!(report.cases.len(), 2);
        // First case: both keywords present, right source, grounded.
        assert!((report.cases[0].keyword_score - 1.0).abs() < 1e-6);
        assert!(report.cases[0].source_hit);
        assert!(report.cases[0].grounded);
        // Second case: scripted answer mentions neither keyword nor source.
        assert!((report.cases[1].keyword_score - 0.0).abs() < 1e-6);
        assert!(!report.cases[1].source_hit);

        assert!((report.keyword_score - 0.5).abs() < 1e-6);
        assert!((report.source_accuracy - 0.5).abs() < 1e-6);

        let text = report.format();
        assert!(text.contains("Evaluation over 2 case(s)"));
        assert!(text.contains("source hit"));
        assert!(text.contains("source miss"));
    }
}
