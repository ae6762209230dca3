use std::sync::Arc;
use tracing::instrument;

use crate::application::services::RagService;
use crate::domain::{split_documents, Document, DomainError, TextSplitter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingSummary {
    pub documents: usize,
    pub chunks: usize,
    pub indexed: usize,
}

/// Offline path: split loaded documents and push their chunks into the store.
pub struct IndexingService {
    rag: Arc<RagService>,
    splitter: TextSplitter,
    batch_size: usize,
}

impl IndexingService {
    pub fn new(rag: Arc<RagService>, splitter: TextSplitter, batch_size: usize) -> Self {
        Self {
            rag,
            splitter,
            batch_size,
        }
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn index_documents(
        &self,
        documents: &[Document],
    ) -> Result<IndexingSummary, DomainError> {
        let mut summary = IndexingSummary {
            documents: documents.len(),
            ..Default::default()
        };
        if documents.is_empty() {
            tracing::warn!("no documents to split");
            return Ok(summary);
        }

        let config = self.splitter.config();
        tracing::info!(
            chunk_size = config.chunk_size,
            chunk_overlap = config.chunk_overlap,
            "splitting documents"
        );
        let chunks = split_documents(documents, &self.splitter);
        summary.chunks = chunks.len();
        if chunks.is_empty() {
            tracing::warn!("no chunks produced");
            return Ok(summary);
        }

        summary.indexed = self.rag.index_chunks(&chunks, self.batch_size).await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::FakeEmbedding;
    use crate::domain::{ChunkingConfig, DocumentMetadata};
    use crate::infrastructure::InMemoryVectorStore;

    fn service(rag: Arc<RagService>) -> IndexingService {
        let splitter = TextSplitter::new(ChunkingConfig::new(40, 10)).unwrap();
        IndexingService::new(rag, splitter, 3)
    }

    #[tokio::test]
    async fn test_index_documents_counts() {
        let rag = Arc::new(RagService::new(
            Arc::new(FakeEmbedding::default()),
            Arc::new(InMemoryVectorStore::new()),
            5,
        ));
        let docs = vec![
            Document::new("short note", DocumentMetadata::new("a.txt", "text")),
            Document::new("", DocumentMetadata::new("b.txt", "text")),
            Document::new(
                "lorem ipsum dolor ".repeat(10),
                DocumentMetadata::new("c.md", "markdown"),
            ),
        ];

        let summary = service(rag.clone()).index_documents(&docs).await.unwrap();
        assert_eq!(summary.documents, 3);
        assert!(summary.chunks > 2);
        assert_eq!(summary.indexed, summary.chunks);
        assert_eq!(rag.indexed_count().await.unwrap(), summary.chunks);
    }

    #[tokio::test]
    async fn test_index_nothing() {
        let rag = Arc::new(RagService::new(
            Arc::new(FakeEmbedding::default()),
            Arc::new(InMemoryVectorStore::new()),
            5,
        ));
        let summary = service(rag).index_documents(&[]).await.unwrap();
        assert_eq!(summary, IndexingSummary::default());
    }
}
