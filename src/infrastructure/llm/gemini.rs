use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::gemini;

use crate::domain::{ports::LlmService, DomainError};
use crate::infrastructure::config::LlmConfig;

pub struct GeminiLlm {
    client: gemini::Client,
    model: String,
    temperature: f64,
}

impl GeminiLlm {
    pub fn from_config(config: &LlmConfig, api_key: &str) -> Result<Self, DomainError> {
        let client = gemini::Client::new(api_key)
            .map_err(|e| DomainError::internal(format!("gemini client: {e}")))?;
        Ok(Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LlmService for GeminiLlm {
    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        let agent = self
            .client
            .agent(&self.model)
            .preamble(system)
            .temperature(self.temperature)
            .build();

        agent
            .prompt(prompt)
            .await
            .map_err(|e| DomainError::generation(e.to_string()))
    }
}
