//! Retry and timeout wrapper over the generation backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::strip_special_tokens;
use super::LlmBackend;
use super::LlmClient;
use crate::errors::DocragError;
use crate::errors::Result;

/// Wraps an [`LlmBackend`] with the crate's boundary-call policy: every
/// call runs under a timeout, transient failures get one round of backoff
/// retries, and the completion comes back stripped of provider artifacts.
/// An empty completion is an error, never a silent empty answer.
pub struct LlmService {
    backend: Arc<dyn LlmBackend>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry_count: u32,
    backoff_ms: u64,
    timeout: Duration,
}

impl LlmService {
    /// Create a new LLM service backed by the configured HTTP provider
    pub fn new(config: &crate::config::AppConfig) -> Result<Self> {
        let client = LlmClient::new(&config.llm)?;

        Ok(Self {
            backend: Arc::new(client),
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            retry_count: config.retry_count(),
            backoff_ms: config.backoff_ms(),
            timeout: Duration::from_secs(config.timeout_secs()),
        })
    }

    /// Create a service over any backend (used by tests and local mode)
    pub fn from_backend(
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
        runtime: &crate::config::RuntimeConfig,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature,
            max_tokens,
            retry_count: runtime.retry_count,
            backoff_ms: runtime.backoff_ms,
            timeout: Duration::from_secs(runtime.timeout_secs),
        }
    }

    /// Generate a completion using the configured sampling parameters
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_params(prompt, self.temperature, self.max_tokens)
            .await
    }

    /// Generate a completion with explicit sampling parameters
    pub async fn generate_with_params(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let attempts = self.retry_count + 1;
        let mut attempt = 1u32;
        loop {
            let err = match tokio::time::timeout(
                self.timeout,
                self.backend.generate(prompt, temperature, max_tokens),
            )
            .await
            {
                Ok(Ok(text)) => {
                    let cleaned = strip_special_tokens(&text);
                    if cleaned.is_empty() {
                        DocragError::generation("model returned an empty completion")
                    } else {
                        return Ok(cleaned);
                    }
                }
                Ok(Err(e)) => e,
                Err(_) => DocragError::generation(format!(
                    "generation call timed out after {}s",
                    self.timeout.as_secs()
                )),
            };

            if !err.is_transient() || attempt >= attempts {
                return Err(err);
            }
            warn!(
                "Attempt {}/{}: generation call failed: {}",
                attempt, attempts, err
            );
            tokio::time::sleep(Duration::from_millis(self.backoff_ms * u64::from(attempt))).await;
            attempt += 1;
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}
