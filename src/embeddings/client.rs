//! HTTP embedding backends.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::EmbeddingBackend;
use crate::config::EmbeddingsConfig;
use crate::errors::DocragError;
use crate::errors::Result;

/// Wire protocols the client can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Hosted `OpenAI`-compatible `/embeddings` endpoint.
    OpenAI,
    /// Local Ollama daemon.
    Ollama,
}

impl EmbeddingProvider {
    /// Parse a provider name from configuration.
    ///
    /// # Errors
    /// `ConfigError` for unknown provider names.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(DocragError::config(format!(
                "unknown embedding provider: {other} (expected \"openai\" or \"ollama\")"
            ))),
        }
    }
}

/// Speaks the OpenAI and Ollama embedding wire formats over one pooled
/// connection.
pub struct EmbeddingClient {
    http: Client,
    provider: EmbeddingProvider,
    model: String,
    endpoint: String,
    api_key: Option<String>,
}

impl EmbeddingClient {
    /// Build a client for the provider named in `config`.
    ///
    /// # Errors
    /// Unknown provider names, or a transport that fails to construct.
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let provider = EmbeddingProvider::parse(&config.provider)?;
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

    fn bearer_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| DocragError::config("OpenAI API key not provided"))
    }

    /// POST a JSON body and decode a JSON reply, mapping transport failures
    /// to `HttpError` and non-2xx replies to `EmbeddingError`.
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
            return Err(DocragError::embedding(format!(
                "{url} returned {status}: {detail}"
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| DocragError::embedding(format!("unparseable reply from {url}: {e}")))
    }

    /// Embed one text.
    ///
    /// # Errors
    /// Transport failures, non-success statuses and replies that do not
    /// decode.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        match self.provider {
            EmbeddingProvider::OpenAI => self.generate_openai(text).await,
            EmbeddingProvider::Ollama => self.generate_ollama(text).await,
        }
    }

    /// Embed several texts in one round trip where the provider supports it.
    ///
    /// # Errors
    /// Same failure modes as [`Self::generate`]; any single failure fails
    /// the whole batch.
    pub async fn generate_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        match self.provider {
            EmbeddingProvider::OpenAI => self.generate_batch_openai(texts).await,
            EmbeddingProvider::Ollama => {
                // Ollama has no batch endpoint; fan out with bounded
                // concurrency. `buffered` keeps input order.
                use futures::stream;
                use futures::stream::StreamExt;
                use futures::stream::TryStreamExt;

                let concurrency = texts.len().clamp(1, 16);
                // Futures are built eagerly (they stay inert until polled)
                // to sidestep rust-lang/rust#89976 in the boxed trait future.
                let calls: Vec<_> = texts
                    .into_iter()
                    .map(|text| self.generate_ollama(text))
                    .collect();
                stream::iter(calls)
                    .buffered(concurrency)
                    .try_collect()
                    .await
            }
        }
    }

    async fn generate_openai(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Payload<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct Reply {
            data: Vec<Row>,
        }

        #[derive(Deserialize)]
        struct Row {
            embedding: Vec<f32>,
        }

        let key = self.bearer_key()?;
        let reply: Reply = self
            .post_json(
                "/embeddings",
                Some(key),
                &Payload {
                    model: &self.model,
                    input: text,
                },
            )
            .await?;

        reply
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| DocragError::embedding("No embedding in response"))
    }

    async fn generate_batch_openai(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct Payload<'a> {
            model: &'a str,
            input: Vec<&'a str>,
        }

        #[derive(Deserialize)]
        struct Reply {
            data: Vec<Row>,
        }

        #[derive(Deserialize)]
        struct Row {
            embedding: Vec<f32>,
        }

        let expected = texts.len();
        debug!("Embedding batch of {} texts", expected);

        let key = self.bearer_key()?;
        let reply: Reply = self
            .post_json(
                "/embeddings",
                Some(key),
                &Payload {
                    model: &self.model,
                    input: texts,
                },
            )
            .await?;

        if reply.data.len() != expected {
            return Err(DocragError::embedding(format!(
                "Expected {expected} embeddings, got {}",
                reply.data.len()
            )));
        }
        Ok(reply.data.into_iter().map(|row| row.embedding).collect())
    }

    async fn generate_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct Payload<'a> {
            prompt: &'a str,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct Reply {
            embedding: Vec<f32>,
        }

        let reply: Reply = self
            .post_json(
                "/api/embeddings",
                None,
                &Payload {
                    prompt: text,
                    model: &self.model,
                },
            )
            .await?;
        Ok(reply.embedding)
    }
}

#[async_trait]
impl EmbeddingBackend for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate(text).await
    }

    async fn embed_batch(&self, texts: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        self.generate_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_config(provider: &str, model: &str, endpoint: &str) -> EmbeddingsConfig {
        EmbeddingsConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            ..EmbeddingsConfig::default()
        }
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(
            EmbeddingProvider::parse("openai").unwrap(),
            EmbeddingProvider::OpenAI
        );
        assert_eq!(
            EmbeddingProvider::parse("Ollama").unwrap(),
            EmbeddingProvider::Ollama
        );
        assert!(EmbeddingProvider::parse("qdrant").is_err());
    }

    #[test]
    fn test_unknown_provider_fails_construction() {
        let config = live_config("qdrant", "m", "http://localhost");
        assert!(EmbeddingClient::new(&config).is_err());
    }

    #[tokio::test]
    #[ignore = "needs OPENAI_API_KEY and network access"]
    async fn test_openai_embedding() {
        let mut config = live_config(
            "openai",
            "text-embedding-3-small",
            "https://api.openai.com/v1",
        );
        config.api_key = std::env::var("OPENAI_API_KEY").ok();
        let client = EmbeddingClient::new(&config).unwrap();

        let embedding = client.generate("hello embeddings").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }

    #[tokio::test]
    #[ignore = "needs a local Ollama daemon"]
    async fn test_ollama_embedding() {
        let config = live_config("ollama", "bge-m3", "http://localhost:11434");
        let client = EmbeddingClient::new(&config).unwrap();

        let embedding = client.generate("hello embeddings").await.unwrap();
        assert_eq!(embedding.len(), 1024);
    }
}
