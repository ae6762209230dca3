use drive_rag::api::{create_router, AppState};
use drive_rag::application::{AskService, ConversationMemory, PromptAssembler, RagService};
use drive_rag::domain::ports::VectorStore;
use drive_rag::infrastructure::{
    vector_store, AppConfig, GeminiEmbedding, GeminiLlm, ResilientEmbedding, ResilientLlm,
    RetryPolicy,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    drive_rag::init_tracing("api=debug,drive_rag=debug,tower_http=debug");

    let config = AppConfig::load()?;
    let api_key = config.require_api_key()?.to_string();
    let index_dir = config.require_index_dir()?;
    info!(index = %index_dir.display(), backend = ?config.config.vector_store.backend, "starting");

    let policy = RetryPolicy::from_config(&config.config.retry);
    let embedding = ResilientEmbedding::new(
        GeminiEmbedding::from_config(&config.config.embedding, &api_key)?,
        policy.clone(),
    );
    let llm = ResilientLlm::new(
        GeminiLlm::from_config(&config.config.llm, &api_key)?,
        policy,
    );

    let store =
        vector_store::from_config(&config.config, &config.config.embedding.model, false).await?;
    let indexed = store.count().await?;
    if indexed == 0 {
        tracing::warn!("vector store is empty; answers will have no context");
    }
    info!(chunks = indexed, "vector store loaded");

    let rag = Arc::new(RagService::new(
        Arc::new(embedding),
        store,
        config.config.rag.top_k,
    ));
    let assembler = PromptAssembler::new(
        config.system_prompt(),
        config.config.memory.max_history_turns,
    );
    let memory = Arc::new(ConversationMemory::new());
    if let Some(idle) = config.config.memory.session_idle() {
        memory.spawn_idle_sweeper(idle);
        info!(idle_secs = idle.as_secs(), "idle sessions will be dropped");
    }
    let ask = Arc::new(AskService::new(rag, Arc::new(llm), memory, assembler));

    let addr = SocketAddr::new(
        config.config.server.host.parse()?,
        config.config.server.port,
    );
    let app = create_router(AppState::new(ask, config));

    info!("API server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
