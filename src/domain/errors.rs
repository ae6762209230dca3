use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Drive error: {0}")]
    Drive(String),
}

impl DomainError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn retrieval(msg: impl Into<String>) -> Self {
        Self::Retrieval(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn drive(msg: impl Into<String>) -> Self {
        Self::Drive(msg.into())
    }

    /// Whether a remote call failing with this error may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Embedding(_)
                | Self::Generation(_)
                | Self::Retrieval(_)
                | Self::Timeout(_)
                | Self::Drive(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
