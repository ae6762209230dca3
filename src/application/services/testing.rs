//! Deterministic fakes for the remote ports.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    ports::{EmbeddingService, LlmService},
    Document, DocumentChunk, DocumentMetadata, DomainError, Embedding,
};

const DIMENSION: usize = 64;

/// Bag-of-words embedding: each lowercase word bumps one hashed bucket.
#[derive(Default)]
pub struct FakeEmbedding {
    pub calls: AtomicUsize,
}

impl FakeEmbedding {
    fn vector(text: &str) -> Embedding {
        let mut v = vec![0.0f32; DIMENSION];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
            v[(hash % DIMENSION as u64) as usize] += 1.0;
        }
        Embedding::new(v)
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        "fake-bow"
    }
}

/// Replies with a canned answer and records every prompt it saw.
pub struct FakeLlm {
    pub reply: Result<String, String>,
    pub prompts: Mutex<Vec<(String, String)>>,
    pub delay: Option<Duration>,
}

impl FakeLlm {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LlmService for FakeLlm {
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(DomainError::generation)
    }
}

pub fn chunk(content: &str) -> DocumentChunk {
    let doc = Document::new(content, DocumentMetadata::new("test.txt", "text"));
    DocumentChunk::new(&doc, content, 0)
}
