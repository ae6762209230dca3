use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::services::DEFAULT_PREAMBLE;
use crate::domain::ChunkingConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Older `.env` files name the key this way.
pub const FALLBACK_API_KEY_VAR: &str = "GOOGLE_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("vector store directory not found at {0}; run the indexer first")]
    IndexNotFound(PathBuf),
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid setting {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub config: Config,
    pub prompts: PromptsConfig,
    /// Read from the environment only, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub memory: MemoryConfig,
    pub vector_store: VectorStoreConfig,
    pub retry: RetryConfig,
    pub indexing: IndexingConfig,
    pub cors: CorsConfig,
    pub drive: DriveConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash-latest".to_string(),
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "embedding-001".to_string(),
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        let chunking = ChunkingConfig::default();
        Self {
            top_k: 5,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
        }
    }
}

impl RagConfig {
    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig::new(self.chunk_size, self.chunk_overlap)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Turns of history included in each prompt. The stored log is unbounded.
    pub max_history_turns: usize,
    /// Sessions untouched for this long are dropped. 0 keeps them forever.
    pub session_idle_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 10,
            session_idle_secs: 24 * 60 * 60,
        }
    }
}

impl MemoryConfig {
    pub fn session_idle(&self) -> Option<Duration> {
        (self.session_idle_secs > 0).then(|| Duration::from_secs(self.session_idle_secs))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    #[default]
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorStoreBackend,
    pub path: PathBuf,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::Local,
            path: PathBuf::from("data/vector_store"),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "knowledge_base".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            multiplier: 2.0,
            timeout_seconds: 60,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub source_dir: PathBuf,
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("data/downloaded_files"),
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub token_path: PathBuf,
    pub folder_id: Option<String>,
    pub api_base: String,
    pub token_url: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("credentials/token.json"),
            folder_id: None,
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub system: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

impl AppConfig {
    /// Loads `APP_CONFIG` (or `config/app.yaml`), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("APP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(path)
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let cfg = &mut self.config;
        if let Some(host) = lookup("SERVER_HOST") {
            cfg.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT").and_then(|p| p.parse().ok()) {
            cfg.server.port = port;
        }
        if let Some(path) = lookup("VECTOR_STORE_PATH") {
            cfg.vector_store.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("QDRANT_URL") {
            cfg.vector_store.qdrant_url = url;
        }
        if let Some(model) = lookup("LLM_MODEL") {
            cfg.llm.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            cfg.embedding.model = model;
        }
        let non_blank = |key: &str| lookup(key).filter(|k| !k.trim().is_empty());
        self.api_key = non_blank(API_KEY_VAR).or_else(|| non_blank(FALLBACK_API_KEY_VAR));
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cfg = &self.config;
        cfg.rag
            .chunking()
            .validate()
            .map_err(|e| ConfigError::invalid("rag.chunk_overlap", e.to_string()))?;
        if cfg.rag.top_k == 0 {
            return Err(ConfigError::invalid("rag.top_k", "must be at least 1"));
        }
        if cfg.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if !cfg.retry.multiplier.is_finite() || cfg.retry.multiplier < 1.0 {
            return Err(ConfigError::invalid("retry.multiplier", "must be a finite number >= 1.0"));
        }
        if cfg.indexing.batch_size == 0 {
            return Err(ConfigError::invalid("indexing.batch_size", "must be at least 1"));
        }
        if !(0.0..=2.0).contains(&cfg.llm.temperature) {
            return Err(ConfigError::invalid("llm.temperature", "must be within 0.0..=2.0"));
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::Missing(API_KEY_VAR.to_string()))
    }

    /// The serving process refuses to start without an existing index directory.
    pub fn require_index_dir(&self) -> Result<&Path, ConfigError> {
        let path = self.config.vector_store.path.as_path();
        if self.config.vector_store.backend == VectorStoreBackend::Local && !path.is_dir() {
            return Err(ConfigError::IndexNotFound(path.to_path_buf()));
        }
        Ok(path)
    }

    pub fn system_prompt(&self) -> &str {
        &self.prompts.system
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.config.rag.top_k, 5);
        assert_eq!(cfg.config.rag.chunking(), ChunkingConfig::new(1000, 100));
        assert_eq!(cfg.config.llm.temperature, 0.3);
        assert_eq!(cfg.config.server.port, 5000);
        assert_eq!(cfg.system_prompt(), DEFAULT_PREAMBLE);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_sections() {
        let cfg = AppConfig::from_yaml(
            "rag:\n  top_k: 3\nvector_store:\n  backend: qdrant\nprompts:\n  system: Be short.\n",
        )
        .unwrap();
        assert_eq!(cfg.config.rag.top_k, 3);
        assert_eq!(cfg.config.rag.chunk_size, 1000);
        assert_eq!(cfg.config.vector_store.backend, VectorStoreBackend::Qdrant);
        assert_eq!(cfg.system_prompt(), "Be short.");
    }

    #[test]
    fn test_env_overrides_and_api_key() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(env(&[
            ("SERVER_PORT", "8080"),
            ("VECTOR_STORE_PATH", "/tmp/idx"),
            ("GEMINI_API_KEY", "secret"),
        ]));
        assert_eq!(cfg.config.server.port, 8080);
        assert_eq!(cfg.config.vector_store.path, PathBuf::from("/tmp/idx"));
        assert_eq!(cfg.require_api_key().unwrap(), "secret");
    }

    #[test]
    fn test_google_api_key_fallback() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(env(&[("GOOGLE_API_KEY", "legacy")]));
        assert_eq!(cfg.require_api_key().unwrap(), "legacy");

        cfg.apply_overrides(env(&[("GEMINI_API_KEY", "new"), ("GOOGLE_API_KEY", "legacy")]));
        assert_eq!(cfg.require_api_key().unwrap(), "new");

        cfg.apply_overrides(env(&[("GEMINI_API_KEY", " "), ("GOOGLE_API_KEY", "legacy")]));
        assert_eq!(cfg.require_api_key().unwrap(), "legacy");
    }

    #[test]
    fn test_retry_multiplier_must_grow() {
        for bad in ["0.5", "-2.0", ".nan", ".inf"] {
            let cfg = AppConfig::from_yaml(&format!("retry:\n  multiplier: {bad}\n")).unwrap();
            let err = cfg.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref key, .. } if key == "retry.multiplier"),
                "multiplier {bad}: {err}"
            );
        }
        let cfg = AppConfig::from_yaml("retry:\n  multiplier: 1.0\n").unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_session_idle_zero_disables_eviction() {
        let cfg = AppConfig::from_yaml("memory:\n  session_idle_secs: 0\n").unwrap();
        assert_eq!(cfg.config.memory.session_idle(), None);
        assert_eq!(
            AppConfig::default().config.memory.session_idle(),
            Some(Duration::from_secs(86_400))
        );
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(env(&[("GEMINI_API_KEY", "  ")]));
        assert!(matches!(cfg.require_api_key(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_invalid_chunking_rejected() {
        let cfg = AppConfig::from_yaml("rag:\n  chunk_size: 100\n  chunk_overlap: 100\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_missing_index_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.config.vector_store.path = dir.path().join("absent");
        assert!(matches!(cfg.require_index_dir(), Err(ConfigError::IndexNotFound(_))));

        cfg.config.vector_store.path = dir.path().to_path_buf();
        assert!(cfg.require_index_dir().is_ok());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.config.rag.top_k, 5);
    }
}
