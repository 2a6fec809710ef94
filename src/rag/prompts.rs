//! Prompt templates for RAG queries.
//!
//! Templates use `{{name}}` markers. A template is split into literal and
//! variable segments once at construction, so the assembler's repeated
//! re-renders never rescan the text.

use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Var(String),
}

/// A compiled prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let segments = split_segments(&template.into());
        let mut variables: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Var(name) = segment {
                if !variables.contains(name) {
                    variables.push(name.clone());
                }
            }
        }
        Self {
            segments,
            variables,
        }
    }

    /// Substitute values into the template. A marker with no matching value
    /// is emitted verbatim, so missing variables are visible in the output.
    #[must_use]
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Var(name) => match values.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                },
            }
        }
        out
    }

    /// Variable names in order of first appearance.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        self.variables.as_slice()
    }
}

/// Split on `{{name}}` markers. An unterminated `{{` or an empty `{{}}`
/// stays literal text.
fn split_segments(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let Some(name_len) = rest[open + 2..].find("}}") else {
            break;
        };
        let name = &rest[open + 2..open + 2 + name_len];
        let marker_end = open + 2 + name_len + 2;
        if name.is_empty() {
            push_text(&mut segments, &rest[..marker_end]);
        } else {
            push_text(&mut segments, &rest[..open]);
            segments.push(Segment::Var(name.to_string()));
        }
        rest = &rest[marker_end..];
    }
    push_text(&mut segments, rest);

    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

/// Built-in prompts for answering against retrieved passages.
pub struct AnswerPrompts;

impl AnswerPrompts {
    /// Question answering over retrieved source passages
    #[must_use]
    pub fn grounded_answer() -> PromptTemplate {
        PromptTemplate::new(
            r"You are a careful assistant answering questions about a private document collection.

Conversation so far:
{{history}}

Source passages:
{{sources}}

Question: {{question}}

Instructions:
1. Answer using only the source passages above.
2. Cite every claim with the marker of the passage that supports it, like [S1].
3. If the passages do not contain the answer, say so plainly instead of guessing.
4. Be concise.

Answer:",
        )
    }

    /// Fallback when retrieval produced nothing usable
    #[must_use]
    pub fn no_sources() -> PromptTemplate {
        PromptTemplate::new(
            r"You are a careful assistant answering questions about a private document collection.

Conversation so far:
{{history}}

No relevant source passages were found for this question.

Question: {{question}}

Instructions:
1. Say that the document collection does not cover this. Do not invent sources or citation markers.
2. If the conversation above already answers the question, you may restate that answer.

Answer:",
        )
    }
}
