use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A source document as handed to the ingestion pipeline.
///
/// Immutable once created; re-ingesting under the same `id` supersedes the
/// previous version in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier, normally the file stem.
    pub id: String,
    /// Human-readable origin shown in citations, normally the file name.
    pub source: String,
    /// Extracted plain text.
    pub text: String,
    /// Optional grouping label (e.g. "policies").
    pub category: Option<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            text: text.into(),
            category: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// SHA-256 hex digest of the extracted text. Used to skip unchanged
    /// documents on re-ingestion.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A bounded, overlapping slice of a document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub source: String,
    /// Position within the parent document, starting at 0.
    pub seq: usize,
    pub text: String,
    pub category: Option<String>,
}

/// A chunk paired with its embedding vector, ready for the index.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A chunk returned from a vector query together with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl From<&str> for TurnRole {
    fn from(value: &str) -> Self {
        match value {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// One message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            citations: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            citations,
        }
    }
}

/// A reference from an answer back to the chunk that supports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub document_id: String,
    pub source: String,
    pub chunk_seq: usize,
    pub score: f32,
    /// Short preview of the cited passage.
    pub excerpt: String,
}

impl Citation {
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            document_id: scored.chunk.document_id.clone(),
            source: scored.chunk.source.clone(),
            chunk_seq: scored.chunk.seq,
            score: (scored.similarity * 10_000.0).round() / 10_000.0,
            excerpt: excerpt(&scored.chunk.text),
        }
    }
}

/// Build a citation preview: the first two sentences, clipped to 200 chars.
pub fn excerpt(text: &str) -> String {
    let sentences: Vec<&str> = text.split(". ").collect();
    let mut out = sentences
        .iter()
        .take(2)
        .copied()
        .collect::<Vec<_>>()
        .join(". ");
    if sentences.len() > 2 {
        out.push_str("...");
    }
    if out.chars().count() > 200 {
        out = out.chars().take(197).collect();
        out.push_str("...");
    }
    out
}

/// The synthesizer's output before response packaging.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    /// True only when the answer text overlaps a cited chunk.
    pub grounded: bool,
}

/// Full result of one question through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub grounded: bool,
    pub model: String,
    pub latency_ms: u64,
    pub session_id: String,
}

impl ChatResponse {
    /// Format the response for display
    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Answer: {}\n", self.answer));

        if self.citations.is_empty() {
            output.push_str("\nSources: none\n");
        } else {
            output.push_str(&format!("\nSources ({}):\n", self.citations.len()));
            for (i, citation) in self.citations.iter().enumerate() {
                output.push_str(&format!(
                    "  {}. {} (chunk {}, similarity: {:.3})\n     {}\n",
                    i + 1,
                    citation.source,
                    citation.chunk_seq,
                    citation.score,
                    citation.excerpt
                ));
            }
        }

        output.push_str(&format!(
            "\nGrounded: {} | Model: {} | Latency: {}ms\n",
            if self.grounded { "yes" } else { "no" },
            self.model,
            self.latency_ms
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_changes_with_text() {
        let a = Document::new("doc", "doc.md", "hello world");
        let b = Document::new("doc", "doc.md", "hello world!");
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), Document::new("x", "y", "hello world").fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_excerpt_takes_two_sentences() {
        let text = "First sentence. Second sentence. Third sentence.";
        assert_eq!(excerpt(text), "First sentence. Second sentence...");
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(excerpt("Just one line"), "Just one line");
    }

    #[test]
    fn test_excerpt_clips_long_sentences() {
        let text = "x".repeat(500);
        let e = excerpt(&text);
        assert_eq!(e.chars().count(), 200);
        assert!(e.ends_with("..."));
    }

    #[test]
    fn test_turn_role_round_trip() {
        assert_eq!(TurnRole::from("assistant"), TurnRole::Assistant);
        assert_eq!(TurnRole::from("user"), TurnRole::User);
        assert_eq!(TurnRole::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_response_format_mentions_sources() {
        let response = ChatResponse {
            answer: "42".to_string(),
            citations: vec![Citation {
                document_id: "guide".to_string(),
                source: "guide.md".to_string(),
                chunk_seq: 3,
                score: 0.91,
                excerpt: "The answer is 42".to_string(),
            }],
            grounded: true,
            model: "test-model".to_string(),
            latency_ms: 12,
            session_id: "s1".to_string(),
        };
        let text = response.format();
        assert!(text.contains("guide.md"));
        assert!(text.contains("Grounded: yes"));
    }
}
