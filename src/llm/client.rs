//! HTTP chat completion backends.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::LlmBackend;
use crate::config::LlmConfig;
use crate::errors::DocragError;
use crate::errors::Result;

/// Supported generation providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// `OpenAI`-compatible chat completions API (`OpenAI`, OpenRouter, vLLM)
    OpenAI,
    /// Ollama local generation
    Ollama,
}

impl LlmProvider {
    /// Parse a provider name from configuration.
    ///
    /// # Errors
    /// `ConfigError` for unknown provider names.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" | "openrouter" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(DocragError::config(format!(
                "unknown llm provider: {other} (expected \"openai\", \"openrouter\", or \"ollama\")"
            ))),
        }
    }
}

/// Speaks the OpenAI chat-completions and Ollama generate wire formats
/// over one pooled connection.
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// Build a client for the provider named in `config`.
    ///
    /// # Errors
    /// Unknown provider names, or a transport that fails to construct.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let provider = LlmProvider::parse(&config.provider)?;
        // Transport ceiling only; per-call deadlines live in the service.
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DocragError::Http(e.to_string()))?;

        Ok(Self {
            http,
            provider,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// POST a JSON body and decode a JSON reply, mapping transport failures
    /// to `HttpError` and non-2xx replies to `GenerationError`.
    async fn post_json<B, R>(&self, path: &str, bearer: Option<&str>, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.endpoint);
        debug!("POST {}", url);

        let mut request = self.http.post(&url).json(body);
        if let Some(key) = bearer {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DocragError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocragError::generation(format!(
                "{url} returned {status}: {detail}"
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| DocragError::generation(format!("unparseable reply from {url}: {e}")))
    }

    /// Generate a completion for a prompt.
    ///
    /// # Errors
    /// Transport failures, non-success statuses and replies that do not
    /// decode.
    pub async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAI => self.complete_openai(prompt, temperature, max_tokens).await,
            LlmProvider::Ollama => self.complete_ollama(prompt, temperature, max_tokens).await,
        }
    }

    async fn complete_openai(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct Payload<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct Reply {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ReplyMessage,
        }

        #[derive(Deserialize)]
        struct ReplyMessage {
            content: String,
        }

        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| DocragError::config("LLM API key not provided"))?;

        let reply: Reply = self
            .post_json(
                "/chat/completions",
                Some(key),
                &Payload {
                    model: &self.model,
                    messages: vec![Message {
                        role: "user",
                        content: prompt,
                    }],
                    temperature,
                    max_tokens,
                },
            )
            .await?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| DocragError::generation("No completion in response"))
    }

    async fn complete_ollama(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct Payload<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Deserialize)]
        struct Reply {
            response: String,
        }

        let reply: Reply = self
            .post_json(
                "/api/generate",
                None,
                &Payload {
                    model: &self.model,
                    prompt,
                    stream: false,
                    options: Options {
                        temperature,
                        num_predict: max_tokens,
                    },
                },
            )
            .await?;
        Ok(reply.response)
    }
}

#[async_trait]
impl LlmBackend for LlmClient {
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        self.complete(prompt, temperature, max_tokens).await
    }
}
