//! RAG CLI - Command-line interface
//!
//! Usage:
//!   rag                      populate the collection, then ask the configured question
//!   rag ingest               populate the collection only
//!   rag query [question]     ask against an already populated collection
//!
//! Global options: `--config <file.toml>` and `--backend qdrant|memory`.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use rag_core::{AppConfig, LlmClient, LoggingConfig};
use rag_pipeline::{create_llm_client, Ingestor, QueryEngine, QueryOutcome, RagPipeline};
use rag_vector::{create_embedding_client, EmbeddingClient, InMemoryStore, QdrantStore, VectorStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rag")]
#[command(about = "Populate-then-query retrieval-augmented generation demo")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still take precedence)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vector store backend
    #[arg(long, value_enum, default_value_t = Backend::Qdrant, global = true)]
    backend: Backend,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Ingest the corpus, then answer the configured question (default)
    Run,
    /// Ingest the corpus into a fresh collection
    Ingest,
    /// Answer a question against the existing collection
    Query {
        /// Question to ask (defaults to the configured one)
        question: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Qdrant,
    Memory,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // stdout carries only the answer
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn connect_store(backend: Backend, config: &AppConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match backend {
        Backend::Qdrant => Arc::new(
            QdrantStore::from_config(&config.database)
                .with_context(|| format!("connecting to {}", config.database.qdrant_url))?,
        ),
        Backend::Memory => Arc::new(InMemoryStore::new()),
    };
    Ok(store)
}

fn print_outcome(outcome: &QueryOutcome) {
    match outcome {
        QueryOutcome::Answered(answer) => println!("{}", answer.text),
        QueryOutcome::NoContext { query } => {
            println!("No stored document is relevant enough to answer: {query}")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    let store = connect_store(cli.backend, &config)?;
    let embedder: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(&config.llm)?);

    if embedder.dimension() != config.database.vector_dimension {
        tracing::warn!(
            model = embedder.model(),
            model_dimension = embedder.dimension(),
            configured_dimension = config.database.vector_dimension,
            "Embedding model dimension differs from configured collection dimension"
        );
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
            let pipeline = RagPipeline::from_config(store, embedder, llm, &config);
            let (_report, outcome) = pipeline
                .run(&config.corpus.documents, &config.corpus.query)
                .await?;
            print_outcome(&outcome);
        }
        Commands::Ingest => {
            let report = Ingestor::from_config(store, embedder, &config)
                .populate(&config.corpus.documents)
                .await?;
            println!(
                "Inserted {} datapoints into `{}`",
                report.points_written, report.collection
            );
        }
        Commands::Query { question } => {
            if cli.backend == Backend::Memory {
                tracing::warn!("In-memory backend starts empty; run without a subcommand instead");
            }
            let llm: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);
            let question = question.unwrap_or_else(|| config.corpus.query.clone());
            let outcome = QueryEngine::from_config(store, embedder, llm, &config)
                .answer(&question)
                .await?;
            print_outcome(&outcome);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments_runs_demo() {
        let cli = Cli::try_parse_from(["rag"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.backend, Backend::Qdrant);
    }

    #[test]
    fn test_query_subcommand() {
        let cli =
            Cli::try_parse_from(["rag", "query", "What do llamas eat?", "--backend", "memory"])
                .unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Query {
                question: Some("What do llamas eat?".to_string())
            })
        );
        assert_eq!(cli.backend, Backend::Memory);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/rag.toml");
        assert!(load_config(Some(&path)).is_err());
    }
}
