use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, CountPointsBuilder, CreateCollectionBuilder, DeleteCollectionBuilder, Distance,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use uuid::Uuid;

use super::{check_pairs, check_top_k};
use crate::domain::{
    ports::VectorStore, DocumentChunk, DocumentMetadata, DomainError, Embedding, SearchResult,
};

/// Remote index in a Qdrant collection with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantVectorStore {
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| DomainError::retrieval(e.to_string()))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            dimension,
        };

        store.ensure_collection().await?;

        Ok(store)
    }

    async fn ensure_collection(&self) -> Result<(), DomainError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| DomainError::retrieval(e.to_string()))?;

        if !exists {
            tracing::info!(
                collection = %self.collection,
                dimension = self.dimension,
                "creating collection"
            );
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| DomainError::retrieval(e.to_string()))?;
        }

        Ok(())
    }

    fn payload(chunk: &DocumentChunk) -> Result<Payload, DomainError> {
        serde_json::json!({
            "chunk_id": chunk.id.to_string(),
            "document_id": chunk.document_id.to_string(),
            "content": chunk.content,
            "chunk_index": chunk.chunk_index,
            "start_offset": chunk.start_offset,
            "source": chunk.metadata.source,
            "format": chunk.metadata.format,
            "page": chunk.metadata.page,
        })
        .try_into()
        .map_err(|_| DomainError::internal("Failed to create payload"))
    }

    fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<DocumentChunk> {
        let text = |key: &str| match payload.get(key)?.kind.as_ref()? {
            Kind::StringValue(s) => Some(s.clone()),
            _ => None,
        };
        let int = |key: &str| match payload.get(key)?.kind.as_ref()? {
            Kind::IntegerValue(i) => usize::try_from(*i).ok(),
            _ => None,
        };

        Some(DocumentChunk {
            id: text("chunk_id")?.parse::<Uuid>().ok()?,
            document_id: text("document_id")?.parse::<Uuid>().ok()?,
            content: text("content")?,
            chunk_index: int("chunk_index")?,
            start_offset: int("start_offset").unwrap_or(0),
            metadata: DocumentMetadata {
                source: text("source").unwrap_or_default(),
                format: text("format").unwrap_or_default(),
                page: int("page"),
            },
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn add(
        &self,
        chunks: &[DocumentChunk],
        embeddings: &[Embedding],
    ) -> Result<(), DomainError> {
        check_pairs(chunks, embeddings)?;
        if chunks.is_empty() {
            return Ok(());
        }

        let points = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                Ok(PointStruct::new(
                    chunk.id.to_string(),
                    embedding.as_slice().to_vec(),
                    Self::payload(chunk)?,
                ))
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(|e| DomainError::retrieval(e.to_string()))?;

        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        check_top_k(top_k)?;
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, query.as_slice().to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| DomainError::retrieval(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                let chunk = Self::chunk_from_payload(&point.payload);
                if chunk.is_none() {
                    tracing::warn!(
                        collection = %self.collection,
                        "skipping point with malformed payload"
                    );
                }
                Some(SearchResult {
                    chunk: chunk?,
                    score: point.score,
                })
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .map_err(|e| DomainError::retrieval(e.to_string()))?;

        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn clear(&self) -> Result<(), DomainError> {
        self.client
            .delete_collection(DeleteCollectionBuilder::new(&self.collection))
            .await
            .map_err(|e| DomainError::retrieval(e.to_string()))?;
        self.ensure_collection().await
    }
}
