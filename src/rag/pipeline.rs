//! The ask path end to end: retrieve, assemble, generate, record.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::AppConfig;
use crate::database::Database;
use crate::embeddings::EmbeddingService;
use crate::errors::DocragError;
use crate::errors::Result;
use crate::index::PgVectorIndex;
use crate::index::QueryFilter;
use crate::index::VectorIndex;
use crate::llm::LlmService;
use crate::memory::ConversationMemory;
use crate::memory::PostgresConversationStore;
use crate::models::ChatResponse;
use crate::models::ConversationTurn;
use crate::rag::AnswerSynthesizer;
use crate::rag::ContextAssembler;
use crate::rag::Retriever;

/// Complete RAG service
pub struct RagService {
    retriever: Retriever,
    assembler: ContextAssembler,
    synthesizer: AnswerSynthesizer,
    memory: Arc<ConversationMemory>,
    memory_window: usize,
}

impl RagService {
    /// Create a new RAG service wired to Postgres and the configured
    /// HTTP providers.
    ///
    /// # Errors
    /// - Database connection errors
    /// - Embedding service configuration errors (unknown provider, bad endpoint)
    /// - LLM service configuration errors (unknown provider, bad endpoint)
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let database = Database::from_config(config).await?;
        let index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(database.clone()));
        let embeddings = Arc::new(EmbeddingService::new(config)?);
        let llm = LlmService::new(config)?;
        let store = Arc::new(PostgresConversationStore::new(database));
        let memory = Arc::new(ConversationMemory::new(store, config.memory_window()));

        Ok(Self::from_parts(index, embeddings, llm, memory, config))
    }

    /// Create from existing services
    #[must_use]
    pub fn from_parts(
        index: Arc<dyn VectorIndex>,
        embeddings: Arc<EmbeddingService>,
        llm: LlmService,
        memory: Arc<ConversationMemory>,
        config: &AppConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(index, embeddings, config),
            assembler: ContextAssembler::new(config.context_budget()),
            synthesizer: AnswerSynthesizer::new(Arc::new(llm), config.grounding_overlap()),
            memory,
            memory_window: config.memory_window(),
        }
    }

    /// Answer a question within a session.
    ///
    /// # Errors
    /// - `ValidationError` for a blank question or session id
    /// - Embedding, index, and generation failures after their retry budget
    pub async fn ask(&self, question: &str, session_id: &str) -> Result<ChatResponse> {
        self.ask_filtered(question, session_id, QueryFilter::default())
            .await
    }

    /// Answer a question, restricting retrieval to chunks matching `filter`.
    pub async fn ask_filtered(
        &self,
        question: &str,
        session_id: &str,
        filter: QueryFilter,
    ) -> Result<ChatResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocragError::validation("question must not be empty"));
        }
        if session_id.trim().is_empty() {
            return Err(DocragError::validation("session id must not be empty"));
        }

        let start = Instant::now();
        info!("Processing question for session '{}'", session_id);

        debug!("Step 1: Retrieving chunks");
        let chunks = self.retriever.retrieve(question, &filter).await?;

        debug!("Step 2: Loading conversation memory");
        let turns = self.memory.recent(session_id, self.memory_window).await?;

        debug!("Step 3: Assembling context");
        let context = self.assembler.assemble(question, &turns, &chunks);

        debug!("Step 4: Generating answer");
        let answer = self.synthesizer.synthesize(&context).await?;

        // Only a fully successful request becomes part of the history.
        self.memory
            .append_exchange(
                session_id,
                ConversationTurn::user(question),
                ConversationTurn::assistant(&answer.text, answer.citations.clone()),
            )
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "Answered in {}ms ({} citations, grounded: {})",
            latency_ms,
            answer.citations.len(),
            answer.grounded
        );

        Ok(ChatResponse {
            answer: answer.text,
            citations: answer.citations,
            grounded: answer.grounded,
            model: self.synthesizer.model().to_string(),
            latency_ms,
            session_id: session_id.to_string(),
        })
    }

    /// Forget a session's in-process window (used by the eval harness).
    pub fn forget_session(&self, session_id: &str) {
        self.memory.forget(session_id);
    }
}
