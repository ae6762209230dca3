mod ask;
mod indexing;
mod memory;
mod prompt;
mod rag;

#[cfg(test)]
pub(crate) mod testing;

pub use ask::{AskError, AskService, RequestStage};
pub use indexing::{IndexingService, IndexingSummary};
pub use memory::{ConversationMemory, SessionHandle, DEFAULT_SESSION};
pub use prompt::{Prompt, PromptAssembler, DEFAULT_PREAMBLE};
pub use rag::RagService;
