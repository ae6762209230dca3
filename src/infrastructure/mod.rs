//! Adapters behind the domain ports, plus configuration.

pub mod config;
pub mod drive;
pub mod embedding;
pub mod llm;
pub mod loader;
pub mod resilience;
pub mod vector_store;

pub use config::{AppConfig, Config, ConfigError, PromptsConfig, VectorStoreBackend};
pub use drive::{sync_folder, DriveError, GoogleDriveClient, TokenStore};
pub use embedding::GeminiEmbedding;
pub use llm::GeminiLlm;
pub use loader::{load_directory, LoadError, LoadReport};
pub use resilience::{ResilientEmbedding, ResilientLlm, RetryPolicy};
pub use vector_store::{InMemoryVectorStore, LocalVectorStore, QdrantVectorStore};
