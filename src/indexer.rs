use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use drive_rag::application::{IndexingService, RagService};
use drive_rag::domain::TextSplitter;
use drive_rag::infrastructure::{
    load_directory, sync_folder, vector_store, AppConfig, GeminiEmbedding, GoogleDriveClient,
    LocalVectorStore, ResilientEmbedding, RetryPolicy, VectorStoreBackend,
};

/// Builds the vector index from a directory of documents.
#[derive(Parser, Debug)]
#[command(name = "indexer")]
#[command(about = "Load, split and embed documents into the vector store", long_about = None)]
struct Args {
    /// Directory to index [default: indexing.source_dir]
    #[arg(long)]
    source: Option<PathBuf>,

    /// Remove every indexed chunk before indexing
    #[arg(long)]
    reset: bool,

    /// Download this Drive folder into the source directory first
    #[arg(long, env = "DRIVE_FOLDER_ID")]
    drive_folder: Option<String>,

    /// Config file [default: $APP_CONFIG or config/app.yaml]
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    drive_rag::init_tracing("indexer=info,drive_rag=info");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let api_key = config.require_api_key()?;

    let cfg = &config.config;
    let source = args
        .source
        .clone()
        .unwrap_or_else(|| cfg.indexing.source_dir.clone());
    let policy = RetryPolicy::from_config(&cfg.retry);

    if let Some(folder) = &args.drive_folder {
        let drive = GoogleDriveClient::from_config(&cfg.drive, policy.clone())
            .context("failed to set up Google Drive access")?;
        let downloaded = sync_folder(&drive, Some(folder.as_str()), &source).await?;
        info!(
            folder = %folder,
            files = downloaded.len(),
            dir = %source.display(),
            "drive folder synced"
        );
    }

    info!(source = %source.display(), "loading documents");
    let report = load_directory(&source);
    for skipped in &report.skipped {
        info!(path = %skipped.path.display(), reason = %skipped.reason, "skipped");
    }
    if report.documents.is_empty() {
        info!("no documents loaded, nothing to index");
        return Ok(());
    }

    // A reset may switch embedding models, so the old manifest goes before opening.
    if args.reset && cfg.vector_store.backend == VectorStoreBackend::Local {
        LocalVectorStore::remove_files(&cfg.vector_store.path)?;
    }

    let embedding = ResilientEmbedding::new(
        GeminiEmbedding::from_config(&cfg.embedding, api_key)?,
        policy,
    );
    let store = vector_store::from_config(cfg, &cfg.embedding.model, true)
        .await
        .context("failed to open the vector store (use --reset after changing the embedding model)")?;
    let rag = Arc::new(RagService::new(Arc::new(embedding), store, cfg.rag.top_k));

    if args.reset {
        rag.clear_index().await?;
        info!("index cleared");
    }

    let splitter = TextSplitter::new(cfg.rag.chunking())?;
    let indexing = IndexingService::new(rag.clone(), splitter, cfg.indexing.batch_size);
    let summary = indexing.index_documents(&report.documents).await?;

    if summary.chunks == 0 {
        info!("no chunks produced, nothing indexed");
        return Ok(());
    }

    info!(
        files = report.loaded_files,
        skipped = report.skipped.len(),
        documents = summary.documents,
        chunks = summary.chunks,
        indexed = summary.indexed,
        total = rag.indexed_count().await?,
        "indexing finished"
    );
    Ok(())
}
