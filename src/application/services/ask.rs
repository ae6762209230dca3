use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::application::services::{ConversationMemory, PromptAssembler, RagService};
use crate::domain::{ports::LlmService, Conversation, DomainError, Turn};

/// Steps a question goes through. A failure at any step ends the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Retrieving,
    Prompting,
    Generating,
    MemoryUpdate,
    Done,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Retrieving => "retrieving",
            Self::Prompting => "prompting",
            Self::Generating => "generating",
            Self::MemoryUpdate => "memory_update",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("request failed at {stage}: {source}")]
pub struct AskError {
    pub stage: RequestStage,
    #[source]
    pub source: DomainError,
}

impl AskError {
    fn at(stage: RequestStage, source: DomainError) -> Self {
        Self { stage, source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.source, DomainError::Validation(_))
    }
}

/// Retrieval, prompting, generation and memory update for one question.
pub struct AskService {
    rag: Arc<RagService>,
    llm: Arc<dyn LlmService>,
    memory: Arc<ConversationMemory>,
    assembler: PromptAssembler,
}

impl AskService {
    pub fn new(
        rag: Arc<RagService>,
        llm: Arc<dyn LlmService>,
        memory: Arc<ConversationMemory>,
        assembler: PromptAssembler,
    ) -> Self {
        Self {
            rag,
            llm,
            memory,
            assembler,
        }
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    /// Answers `question` within `session_id`. The session stays locked for
    /// the whole request, so concurrent questions on one session run one
    /// after another and every turn lands in call order. No turn is recorded
    /// unless an answer was produced, and a failed first question leaves no
    /// session behind.
    #[instrument(skip(self, question))]
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<String, AskError> {
        if question.trim().is_empty() {
            return Err(AskError::at(
                RequestStage::Received,
                DomainError::validation("question must not be empty"),
            ));
        }

        let session = self.memory.session(session_id).await;
        let result = {
            let mut conversation = session.lock().await;
            self.answer(&mut conversation, question).await
        };
        if result.is_err() {
            self.memory.release(session_id, session).await;
        }
        result
    }

    async fn answer(
        &self,
        conversation: &mut Conversation,
        question: &str,
    ) -> Result<String, AskError> {
        let mut stage = RequestStage::Retrieving;
        let chunks = self
            .rag
            .retrieve(question)
            .await
            .map_err(|e| AskError::at(stage, e))?;
        tracing::debug!(%stage, chunks = chunks.len(), "context retrieved");

        stage = RequestStage::Prompting;
        let prompt = self.assembler.assemble(&chunks, conversation.turns(), question);
        tracing::debug!(%stage, system = %prompt.system, user = %prompt.user, "prompt assembled");

        stage = RequestStage::Generating;
        let answer = self
            .llm
            .complete_with_system(&prompt.system, &prompt.user)
            .await
            .map_err(|e| AskError::at(stage, e))?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(AskError::at(
                stage,
                DomainError::generation("model returned an empty answer"),
            ));
        }

        stage = RequestStage::MemoryUpdate;
        conversation.push(Turn::new(question, answer.clone()));
        tracing::debug!(%stage, turns = conversation.len(), "turn saved");

        stage = RequestStage::Done;
        tracing::info!(%stage, answer_chars = answer.chars().count(), "question answered");
        Ok(answer)
    }
}
