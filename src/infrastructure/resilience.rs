//! Timeouts and bounded retries around the remote ports.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::domain::{
    ports::{EmbeddingService, LlmService},
    DomainError, Embedding,
};
use crate::infrastructure::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            timeout: config.timeout(),
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up. Each attempt is bounded by `timeout`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 1;
        let mut delay = self.initial_delay;

        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(DomainError::timeout(format!(
                    "{operation} exceeded {}s",
                    self.timeout.as_secs_f64()
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "remote call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
                    );
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(operation, attempt, error = %e, "remote call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Adds the retry policy to any embedding backend.
pub struct ResilientEmbedding<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E> ResilientEmbedding<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<E: EmbeddingService> EmbeddingService for ResilientEmbedding<E> {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.policy.run("embed", || self.inner.embed(text)).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        self.policy
            .run("embed_batch", || self.inner.embed_batch(texts))
            .await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

pub struct ResilientLlm<L> {
    inner: L,
    policy: RetryPolicy,
}

impl<L> ResilientLlm<L> {
    pub fn new(inner: L, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<L: LlmService> LlmService for ResilientLlm<L> {
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        self.policy
            .run("generate", || self.inner.complete_with_system(system, prompt))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
            timeout: Duration::from_millis(200),
        }
    }

    /// Fails with `error` for the first `failures` calls, then answers.
    struct FlakyLlm {
        failures: u32,
        error: fn(String) -> DomainError,
        calls: AtomicU32,
    }

    impl FlakyLlm {
        fn new(failures: u32, error: fn(String) -> DomainError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmService for FlakyLlm {
        async fn complete_with_system(&self, _: &str, _: &str) -> Result<String, DomainError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)(format!("failure {n}")))
            } else {
                Ok("answer".to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let llm = ResilientLlm::new(FlakyLlm::new(2, DomainError::Generation), fast_policy(3));
        assert_eq!(llm.complete_with_system("s", "p").await.unwrap(), "answer");
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let llm = ResilientLlm::new(FlakyLlm::new(5, DomainError::Generation), fast_policy(3));
        let err = llm.complete_with_system("s", "p").await.unwrap_err();
        assert!(matches!(err, DomainError::Generation(_)));
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_retried() {
        let llm = ResilientLlm::new(FlakyLlm::new(5, DomainError::Validation), fast_policy(3));
        assert!(llm.complete_with_system("s", "p").await.is_err());
        assert_eq!(llm.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(10),
            ..fast_policy(2)
        };
        let err = policy
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DomainError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Timeout(_)));
    }

    #[test]
    fn test_policy_from_config_keeps_one_attempt() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }
}
