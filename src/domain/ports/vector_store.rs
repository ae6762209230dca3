use crate::domain::{errors::DomainError, DocumentChunk, Embedding, SearchResult};
use async_trait::async_trait;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Appends one entry per `(chunk, embedding)` pair.
    async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Embedding])
        -> Result<(), DomainError>;
    /// The `top_k` nearest entries, nearest first. Fewer when the store is smaller.
    async fn similarity_search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError>;
    async fn count(&self) -> Result<usize, DomainError>;
    /// Removes every entry. Maintenance only.
    async fn clear(&self) -> Result<(), DomainError>;
}
