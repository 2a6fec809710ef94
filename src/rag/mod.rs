//! The question answering pipeline.
//!
//! [`RagService`] is the crate's front door: it validates the question,
//! embeds it, pulls candidate chunks from the vector index, folds in the
//! session's recent turns, renders a budget-bounded prompt, and turns the
//! model's reply into a cited, grounding-checked answer.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use docrag::config::AppConfig;
//! # use docrag::rag::RagService;
//! # async fn demo() -> docrag::Result<()> {
//! let service = RagService::new(&AppConfig::load()?).await?;
//! let response = service.ask("What is the refund policy?", "demo").await?;
//! println!("{}", response.format());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod pipeline;
pub mod prompts;
pub mod retriever;
pub mod synthesizer;

pub use context::AssembledContext;
pub use context::ContextAssembler;
pub use pipeline::RagService;
pub use prompts::AnswerPrompts;
pub use prompts::PromptTemplate;
pub use retriever::Retriever;
pub use synthesizer::AnswerSynthesizer;
