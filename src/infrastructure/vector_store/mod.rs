mod in_memory;
mod local;
mod qdrant;

pub use in_memory::InMemoryVectorStore;
pub use local::LocalVectorStore;
pub use qdrant::QdrantVectorStore;

use std::sync::Arc;

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};
use crate::infrastructure::config::{Config, VectorStoreBackend};

fn check_top_k(top_k: usize) -> Result<(), DomainError> {
    if top_k == 0 {
        return Err(DomainError::validation("top_k must be at least 1"));
    }
    Ok(())
}

fn check_pairs(chunks: &[DocumentChunk], embeddings: &[Embedding]) -> Result<(), DomainError> {
    if chunks.len() != embeddings.len() {
        return Err(DomainError::validation(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(())
}

/// Cosine ranking over `entries`, best first, NaN scores last. The sort is
/// stable, so equal scores keep insertion order.
fn rank<'a, I>(query: &Embedding, entries: I, top_k: usize) -> Vec<SearchResult>
where
    I: IntoIterator<Item = (&'a DocumentChunk, &'a Embedding)>,
{
    let mut results: Vec<SearchResult> = entries
        .into_iter()
        .map(|(chunk, embedding)| SearchResult {
            chunk: chunk.clone(),
            score: query.cosine_similarity(embedding),
        })
        .collect();

    results.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
        (false, false) => b.score.total_cmp(&a.score),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
    results.truncate(top_k);
    results
}

/// The store selected by `vector_store.backend`. `create` lets the indexer
/// start a local index that does not exist yet; the API only opens one.
pub async fn from_config(
    config: &Config,
    model: &str,
    create: bool,
) -> Result<Arc<dyn VectorStore>, DomainError> {
    let settings = &config.vector_store;
    let store: Arc<dyn VectorStore> = match settings.backend {
        VectorStoreBackend::Local if create => {
            Arc::new(LocalVectorStore::create(&settings.path, model)?)
        }
        VectorStoreBackend::Local => Arc::new(LocalVectorStore::open(&settings.path, model)?),
        VectorStoreBackend::Qdrant => Arc::new(
            QdrantVectorStore::new(
                &settings.qdrant_url,
                &settings.collection,
                config.embedding.dimension,
            )
            .await?,
        ),
    };
    Ok(store)
}
