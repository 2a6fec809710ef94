//! LLM text generation boundary.
//!
//! Same shape as the embeddings module: a provider-agnostic [`LlmBackend`]
//! trait, an HTTP client covering `OpenAI`-compatible and Ollama endpoints,
//! and a service wrapper owning retry, timeout, and output hygiene.

pub mod client;
pub mod service;

pub use client::LlmClient;
pub use client::LlmProvider;
pub use service::LlmService;

use async_trait::async_trait;

use crate::Result;

/// Instruction-tuning artifacts some providers leak into completions.
const SPECIAL_TOKENS: &[&str] = &[
    "</s>",
    "<s>",
    "[INST]",
    "[/INST]",
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
];

/// Text generation boundary. HTTP providers in production, scripted fakes
/// in tests.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String>;
}

/// Remove provider special tokens and surrounding whitespace.
#[must_use]
pub fn strip_special_tokens(text: &str) -> String {
    let mut out = text.to_string();
    for token in SPECIAL_TOKENS {
        out = out.replace(token, "");
    }
    out.trim().to_string()
}
