use std::sync::Arc;
use tracing::instrument;

use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    DocumentChunk, DomainError, SearchResult,
};

/// Retriever over the vector store, plus the write path used by indexing.
pub struct RagService {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    default_top_k: usize,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            default_top_k,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// The `default_top_k` most relevant chunks for `question`, scores dropped.
    #[instrument(skip(self), fields(top_k = self.default_top_k))]
    pub async fn retrieve(&self, question: &str) -> Result<Vec<DocumentChunk>, DomainError> {
        let results = self.retrieve_top_k(question, self.default_top_k).await?;
        Ok(results.into_iter().map(|r| r.chunk).collect())
    }

    #[instrument(skip(self))]
    pub async fn retrieve_top_k(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let embedding = self.embedding.embed(query).await?;
        self.vector_store.similarity_search(&embedding, top_k).await
    }

    /// Embeds and stores `chunks` in batches of `batch_size`, preserving order.
    /// Returns the number of chunks written.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub async fn index_chunks(
        &self,
        chunks: &[DocumentChunk],
        batch_size: usize,
    ) -> Result<usize, DomainError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = self.embedding.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }

            self.vector_store.add(batch, &embeddings).await?;
            written += batch.len();
            tracing::info!(written, total = chunks.len(), "indexed batch");
        }

        Ok(written)
    }

    pub async fn indexed_count(&self) -> Result<usize, DomainError> {
        self.vector_store.count().await
    }

    #[instrument(skip(self))]
    pub async fn clear_index(&self) -> Result<(), DomainError> {
        self.vector_store.clear().await
    }
}
