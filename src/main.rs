use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use docrag::chunker::Chunker;
use docrag::config::AppConfig;
use docrag::database::Database;
use docrag::embeddings::EmbeddingService;
use docrag::eval::EvalHarness;
use docrag::index::PgVectorIndex;
use docrag::index::QueryFilter;
use docrag::index::VectorIndex;
use docrag::ingest::IngestionPipeline;
use docrag::rag::RagService;
use docrag::Result;
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docrag")]
#[command(about = "Document Q&A over a local corpus with grounded, cited answers")]
#[command(version)]
struct Cli {
    /// Read configuration from this file instead of config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug-level logging, overriding the configured level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema (pgvector extension, chunk and session tables)
    Init,
    /// Ingest a file or directory into the vector index
    Ingest {
        /// File or directory to ingest (default: the configured data_dir)
        path: Option<PathBuf>,
        /// Re-ingest documents even when their content is unchanged
        #[arg(short, long)]
        force: bool,
    },
    /// Ask a single question
    Ask {
        /// The question to answer
        question: String,
        /// Session identifier for conversation memory
        #[arg(short, long)]
        session: Option<String>,
        /// Restrict retrieval to one document category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Interactive question loop sharing one session
    Chat {
        /// Session identifier for conversation memory
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Score the pipeline against a golden question set
    Eval {
        /// Path to the golden set JSON (default: the configured path)
        #[arg(short, long)]
        golden: Option<PathBuf>,
    },
    /// Show index health and size
    Status,
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    docrag::logging::init_logging_with_config(Some(&config))?;
    info!("Configuration loaded successfully");

    match cli.command {
        Command::Init => {
            handle_init_command(&config).await?;
        }
        Command::Ingest { path, force } => {
            handle_ingest_command(&config, path, force).await?;
        }
        Command::Ask {
            question,
            session,
            category,
        } => {
            handle_ask_command(&config, &question, session, category).await?;
        }
        Command::Chat { session } => {
            handle_chat_command(&config, session).await?;
        }
        Command::Eval { golden } => {
            handle_eval_command(&config, golden).await?;
        }
        Command::Status => {
            handle_status_command(&config).await?;
        }
        Command::Config => {
            handle_config_command(&config);
        }
    }

    Ok(())
}

async fn handle_init_command(config: &AppConfig) -> Result<()> {
    let db = Database::from_config(config).await?;
    db.init_schema(config.embedding_dimension()).await?;
    println!(
        "✅ Schema initialized (vector dimension: {})",
        config.embedding_dimension()
    );
    Ok(())
}

async fn handle_ingest_command(
    config: &AppConfig,
    path: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let db = Database::from_config(config).await?;
    db.init_schema(config.embedding_dimension()).await?;

    let index = Arc::new(PgVectorIndex::new(db));
    let embeddings = Arc::new(EmbeddingService::new(config)?);
    let chunker = Chunker::from_config(config)?;
    let pipeline = IngestionPipeline::new(chunker, embeddings, index, config.ingest_concurrency());

    let target = path.unwrap_or_else(|| PathBuf::from(config.data_dir()));
    println!("📚 Ingesting from {}", target.display());

    let report = pipeline.ingest_path(&target, force).await?;
    println!("{}", report.format());
    Ok(())
}

async fn handle_ask_command(
    config: &AppConfig,
    question: &str,
    session: Option<String>,
    category: Option<String>,
) -> Result<()> {
    let service = RagService::new(config).await?;
    let session_id = session.unwrap_or_else(|| format!("cli-{}", Uuid::new_v4()));

    let filter = QueryFilter {
        category,
        document_id: None,
    };
    let response = service.ask_filtered(question, &session_id, filter).await?;
    println!("{}", response.format());
    Ok(())
}

async fn handle_chat_command(config: &AppConfig, session: Option<String>) -> Result<()> {
    let service = RagService::new(config).await?;
    let session_id = session.unwrap_or_else(|| format!("chat-{}", Uuid::new_v4()));

    println!("💬 Chat session: {}", session_id);
    println!("Type a question, or 'exit' to quit.");

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match service.ask(question, &session_id).await {
            Ok(response) => println!("\n{}", response.format()),
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    println!("Bye!");
    Ok(())
}

async fn handle_eval_command(config: &AppConfig, golden: Option<PathBuf>) -> Result<()> {
    let path = golden.unwrap_or_else(|| PathBuf::from(config.golden_set_path()));
    let cases = EvalHarness::load_cases(&path)?;
    println!(
        "🧪 Running {} golden case(s) from {}",
        cases.len(),
        path.display()
    );

    let service = Arc::new(RagService::new(config).await?);
    let harness = EvalHarness::new(service);
    let report = harness.run(&cases).await;
    println!("{}", report.format());
    Ok(())
}

async fn handle_status_command(config: &AppConfig) -> Result<()> {
    let db = Database::from_config(config).await?;
    db.health_check().await?;

    let index = PgVectorIndex::new(db);
    let chunks = index.chunk_count().await?;

    println!("📊 docrag status");
    println!(
        "  Database: {} (reachable)",
        mask_database_url(config.database_url())
    );
    println!("  Indexed chunks: {}", chunks);
    println!(
        "  Embedding model: {} ({} dimensions)",
        config.embedding_model(),
        config.embedding_dimension()
    );
    println!("  LLM model: {}", config.llm_model());
    Ok(())
}

fn handle_config_command(config: &AppConfig) {
    println!("📋 docrag configuration:");
    println!();

    println!("🗄️  Database:");
    println!("  URL: {}", mask_database_url(config.database_url()));
    println!(
        "  Pool: {}..{} connections, acquire timeout {}s",
        config.min_connections(),
        config.max_connections(),
        config.connection_timeout()
    );
    println!();

    println!("📝 Logging:");
    println!(
        "  Level: {} (backtrace: {})",
        config.logging.level, config.logging.backtrace
    );
    println!();

    println!("📚 Ingestion:");
    println!("  Data dir: {}", config.data_dir());
    println!("  Chunk size: {}", config.chunk_size());
    println!("  Overlap size: {}", config.overlap_size());
    println!("  Concurrency: {}", config.ingest_concurrency());
    println!();

    println!("🧠 Embeddings:");
    println!("  Provider: {}", config.embeddings.provider);
    println!("  Endpoint: {}", config.embeddings.endpoint);
    println!("  Model: {}", config.embedding_model());
    println!("  Dimension: {}", config.embedding_dimension());
    println!(
        "  API key: {}",
        if config.embeddings.api_key.is_some() {
            "set"
        } else {
            "unset"
        }
    );
    println!();

    println!("🤖 LLM:");
    println!("  Provider: {}", config.llm.provider);
    println!("  Endpoint: {}", config.llm_endpoint());
    println!("  Model: {}", config.llm_model());
    println!("  Temperature: {}", config.llm.temperature);
    println!("  Max tokens: {}", config.llm.max_tokens);
    println!(
        "  API key: {}",
        if config.llm.api_key.is_some() {
            "set"
        } else {
            "unset"
        }
    );
    println!();

    println!("🔍 Retrieval:");
    println!("  Top k: {}", config.top_k());
    println!("  Similarity floor: {}", config.similarity_floor());
    println!("  Context budget: {} chars", config.context_budget());
    println!("  Memory window: {} turns", config.memory_window());
    println!("  Grounding overlap: {}", config.grounding_overlap());
    println!();

    println!("⚙️  Runtime:");
    println!("  Retry count: {}", config.retry_count());
    println!("  Backoff: {}ms", config.backoff_ms());
    println!("  Call timeout: {}s", config.timeout_secs());
    println!();

    println!("🧪 Eval:");
    println!("  Golden set: {}", config.golden_set_path());
}

/// Redact credentials from the connection URL for display.
fn mask_database_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return "<invalid url>".to_string();
    };
    match parsed.host_str() {
        Some(host) => format!(
            "{}://{}@{}:{}{}",
            parsed.scheme(),
            parsed.username(),
            host,
            parsed.port().unwrap_or(5432),
            parsed.path()
        ),
        None => "<no host>".to_string(),
    }
}
