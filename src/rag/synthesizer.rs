//! Answer generation, citation parsing, and grounding

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::llm::LlmService;
use crate::models::Answer;
use crate::models::Citation;
use crate::models::ScoredChunk;
use crate::rag::context::AssembledContext;

/// Calls the LLM over an assembled context and turns the raw completion
/// into an [`Answer`] with validated citations and a grounding flag.
pub struct AnswerSynthesizer {
    llm: Arc<LlmService>,
    grounding_overlap: f32,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<LlmService>, grounding_overlap: f32) -> Self {
        Self {
            llm,
            grounding_overlap,
        }
    }

    /// Generate an answer for an assembled context.
    pub async fn synthesize(&self, context: &AssembledContext) -> Result<Answer> {
        let raw = self.llm.generate(&context.prompt).await?;
        Ok(self.parse(&raw, &context.sources))
    }

    /// Parse raw model output against the sources that were in the prompt.
    ///
    /// Markers that do not correspond to an included source are dropped
    /// from the citation list; the answer text itself is left as written.
    #[must_use]
    pub fn parse(&self, raw: &str, sources: &[ScoredChunk]) -> Answer {
        let mut citations = Vec::new();
        let mut cited: Vec<&ScoredChunk> = Vec::new();
        for marker in parse_markers(raw) {
            if marker >= 1 && marker <= sources.len() {
                let scored = &sources[marker - 1];
                citations.push(Citation::from_scored(scored));
                cited.push(scored);
            } else {
                debug!("Dropping citation marker [S{}] with no matching source", marker);
            }
        }

        let answer_tokens = content_tokens(raw);
        let grounded = cited.iter().any(|scored| {
            overlap_fraction(&answer_tokens, &scored.chunk.text) >= self.grounding_overlap
        });

        Answer {
            text: raw.to_string(),
            citations,
            grounded,
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.llm.model()
    }
}

/// Distinct `[S#]` markers in order of first appearance.
fn parse_markers(text: &str) -> Vec<usize> {
    let mut markers = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '[' && chars.peek() == Some(&'S') {
            chars.next(); // skip 'S'
            let mut digits = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_ascii_digit() {
                    digits.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek() == Some(&']') && !digits.is_empty() {
                chars.next();
                if let Ok(marker) = digits.parse::<usize>() {
                    if !markers.contains(&marker) {
                        markers.push(marker);
                    }
                }
            }
        }
    }

    markers
}

/// Lowercased alphanumeric tokens of three or more characters.
fn content_tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of `answer_tokens` that also occur in `chunk_text`.
fn overlap_fraction(answer_tokens: &HashSet<String>, chunk_text: &str) -> f32 {
    if answer_tokens.is_empty() {
        return 0.0;
    }
    let chunk_tokens = content_tokens(chunk_text);
    let hits = answer_tokens
        .iter()
        .filter(|token| chunk_tokens.contains(*token))
        .count();
    hits as f32 / answer_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::llm::LlmBackend;
    use crate::models::Chunk;

    fn scored(seq: usize, text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                document_id: "doc".to_string(),
                source: "doc.md".to_string(),
                seq,
                text: text.to_string(),
                category: None,
            },
            similarity: 0.9,
        }
    }

    fn synthesizer(reply: &str, grounding_overlap: f32) -> AnswerSynthesizer {
        struct Scripted {
            reply: String,
        }

        #[async_trait]
        impl LlmBackend for Scripted {
            async fn generate(&self, _: &str, _: f32, _: u32) -> Result<String> {
                Ok(self.reply.clone())
            }
        }

        let service = LlmService::from_backend(
            Arc::new(Scripted {
                reply: reply.to_string(),
            }),
            "test-model",
            0.2,
            100,
            &RuntimeConfig::default(),
        );
        AnswerSynthesizer::new(Arc::new(service), grounding_overlap)
    }

    #[test]
    fn test_markers_parsed_in_order_of_first_use() {
        assert_eq!(parse_markers("Per [S2], then [S1], then [S2] again."), vec![2, 1]);
        assert_eq!(parse_markers("No markers here."), Vec::<usize>::new());
        assert_eq!(parse_markers("[S12] works"), vec![12]);
        // Malformed markers are ignored.
        assert_eq!(parse_markers("[S] [S1 [Source 1]"), Vec::<usize>::new());
    }

    #[test]
    fn test_unknown_markers_dropped_from_citations() {
        let synth = synthesizer("unused", 0.2);
        let sources = vec![scored(0, "refunds take ten business days")];

        let answer = synth.parse("Refunds take ten days [S1], see also [S7].", &sources);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_seq, 0);
        // The text keeps whatever the model wrote.
        assert!(answer.text.contains("[S7]"));
    }

    #[test]
    fn test_grounded_when_answer_overlaps_cited_chunk() {
        let synth = synthesizer("unused", 0.2);
        let sources = vec![scored(0, "Refunds are processed within ten business days.")];

        let answer = synth.parse("Refunds are processed within ten business days [S1].", &sources);
        assert!(answer.grounded);
        assert_eq!(answer.citations.len(), 1);
    }

    #[test]
    fn test_ungrounded_when_answer_diverges_from_sources() {
        let synth = synthesizer("unused", 0.5);
        let sources = vec![scored(0, "Refunds are processed within ten business days.")];

        let answer = synth.parse(
            "Shipping to Antarctica requires special arrangements and penguins [S1].",
            &sources,
        );
        assert!(!answer.grounded);
        // The citation itself survives; only the grounding flag drops.
        assert_eq!(answer.citations.len(), 1);
    }

    #[test]
    fn test_no_citations_means_ungrounded() {
        let synth = synthesizer("unused", 0.2);
        let sources = vec![scored(0, "Refunds take ten days.")];

        let answer = synth.parse("Refunds take ten days.", &sources);
        assert!(answer.citations.is_empty());
        assert!(!answer.grounded);
    }

    #[tokio::test]
    async fn test_synthesize_end_to_end() -> Result<()> {
        let synth = synthesizer("The warranty covers two years [S1].", 0.2);
        let context = AssembledContext {
            prompt: "ignored by the scripted backend".to_string(),
            sources: vec![scored(3, "The warranty covers two years of normal use.")],
        };

        let answer = synth.synthesize(&context).await?;
        assert!(answer.grounded);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_seq, 3);
        Ok(())
    }
}
