use agri_diagnose::{
    config::AppConfig,
    services::{
        chroma::ChromaClient,
        knowledge::{self, IngestOptions},
        llm::OpenAiClient,
    },
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Load a directory of Markdown notes into the diagnosis knowledge base.
#[derive(Parser, Debug)]
#[command(name = "ingest", version, about)]
struct Args {
    /// Knowledge base directory
    #[arg(long, default_value = "data/knowledge")]
    path: PathBuf,

    /// Drop the collection before ingesting
    #[arg(long)]
    reset: bool,

    /// Maximum chunk length in characters
    #[arg(long, default_value_t = 1500)]
    chunk_size: usize,

    /// Characters carried over between chunks
    #[arg(long, default_value_t = 300)]
    overlap: usize,

    /// Chunks per embedding request
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Concurrent embedding requests
    #[arg(long, default_value_t = 8)]
    max_workers: usize,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "Ingestion failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    if config.openai_api_key.is_empty() {
        return Err("OPENAI_API_KEY is not set".into());
    }

    let options = IngestOptions {
        chunk_size: args.chunk_size,
        overlap: args.overlap,
        batch_size: args.batch_size,
        max_workers: args.max_workers,
    };
    // Fail on bad chunking before touching the network.
    knowledge::split_text("", options.chunk_size, options.overlap)?;

    let documents = knowledge::load_documents(&args.path)?;
    if documents.is_empty() {
        tracing::warn!(path = %args.path.display(), "No Markdown documents found");
        return Ok(());
    }

    let chroma = ChromaClient::new(&config.chroma_url, &config.chroma_collection)?;
    chroma.heartbeat().await?;
    if args.reset {
        tracing::warn!(collection = chroma.collection(), "Resetting collection");
        chroma.delete_collection().await?;
    }

    let embedder = Arc::new(OpenAiClient::new(
        &config.openai_base_url,
        &config.openai_api_key,
        &config.chat_model,
        &config.embedding_model,
        config.llm_temperature,
        config.llm_timeout(),
    )?);

    let start = std::time::Instant::now();
    let summary = knowledge::ingest(&chroma, embedder, &documents, options).await?;
    tracing::info!(
        documents = summary.documents,
        chunks = summary.chunks,
        collection = chroma.collection(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Ingestion complete"
    );
    Ok(())
}
