//! Budget-bounded prompt assembly from memory and retrieved chunks

use std::collections::HashMap;
use std::collections::VecDeque;

use crate::models::ConversationTurn;
use crate::models::ScoredChunk;
use crate::models::TurnRole;
use crate::rag::prompts::AnswerPrompts;

/// A fully rendered prompt plus the chunks that actually made it in.
///
/// `sources[i]` corresponds to marker `[S{i+1}]` in the prompt; chunks
/// dropped during truncation never appear here.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub prompt: String,
    pub sources: Vec<ScoredChunk>,
}

/// Builds the generation prompt under a character budget.
///
/// When the budget is exceeded, oldest conversation turns go first, then
/// lowest-similarity chunks. The instruction preamble and the question are
/// never cut.
pub struct ContextAssembler {
    context_budget: usize,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(context_budget: usize) -> Self {
        Self { context_budget }
    }

    /// Assemble the prompt for a question.
    ///
    /// `turns` are oldest first; `chunks` are best first, as the retriever
    /// returns them.
    #[must_use]
    pub fn assemble(
        &self,
        question: &str,
        turns: &[ConversationTurn],
        chunks: &[ScoredChunk],
    ) -> AssembledContext {
        let mut kept_turns: VecDeque<&ConversationTurn> = turns.iter().collect();
        let mut kept_chunks: Vec<&ScoredChunk> = chunks.iter().collect();

        loop {
            let prompt = render(question, &kept_turns, &kept_chunks);
            if prompt.chars().count() <= self.context_budget {
                return AssembledContext {
                    prompt,
                    sources: kept_chunks.into_iter().cloned().collect(),
                };
            }
            if kept_turns.pop_front().is_some() {
                continue;
            }
            if kept_chunks.pop().is_some() {
                continue;
            }
            // Preamble and question alone exceed the budget; they still go out.
            return AssembledContext {
                prompt,
                sources: Vec::new(),
            };
        }
    }
}

fn render(question: &str, turns: &VecDeque<&ConversationTurn>, chunks: &[&ScoredChunk]) -> String {
    let history = if turns.is_empty() {
        "(none)".to_string()
    } else {
        turns
            .iter()
            .map(|turn| {
                let speaker = match turn.role {
                    TurnRole::User => "User",
                    TurnRole::Assistant => "Assistant",
                };
                format!("{speaker}: {}", turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut values = HashMap::new();
    values.insert("history".to_string(), history);
    values.insert("question".to_string(), question.to_string());

    if chunks.is_empty() {
        return AnswerPrompts::no_sources().render(&values);
    }

    let sources = chunks
        .iter()
        .enumerate()
        .map(|(idx, scored)| {
            format!("[S{}] {}:\n{}", idx + 1, scored.chunk.source, scored.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    values.insert("sources".to_string(), sources);

    AnswerPrompts::grounded_answer().render(&values)
}
