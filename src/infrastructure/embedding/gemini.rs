use async_trait::async_trait;
use rig::client::EmbeddingsClient;
use rig::embeddings::EmbeddingModel;
use rig::providers::gemini;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

type GeminiModel = gemini::embedding::EmbeddingModel;

/// Gemini text embeddings.
pub struct GeminiEmbedding {
    client: gemini::Client,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    pub fn from_config(config: &EmbeddingConfig, api_key: &str) -> Result<Self, DomainError> {
        let client = gemini::Client::new(api_key)
            .map_err(|e| DomainError::internal(format!("gemini client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: gemini::Client, config: &EmbeddingConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("no embedding returned"))
    }

    /// Vectors come back in the order of `texts`; requests larger than the
    /// provider limit are split and concatenated.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        let model = self
            .client
            .embedding_model_with_ndims(&self.model, self.dimension);

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(GeminiModel::MAX_DOCUMENTS) {
            let owned: Vec<String> = batch.iter().map(|t| t.to_string()).collect();
            let response = model
                .embed_texts(owned)
                .await
                .map_err(|e| DomainError::embedding(e.to_string()))?;

            if response.len() != batch.len() {
                return Err(DomainError::embedding(format!(
                    "requested {} embeddings, received {}",
                    batch.len(),
                    response.len()
                )));
            }
            embeddings.extend(
                response
                    .into_iter()
                    .map(|emb| Embedding::new(emb.vec.into_iter().map(|x| x as f32).collect())),
            );
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
