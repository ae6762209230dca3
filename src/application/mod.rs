//! Application layer - Use cases and orchestration.
//!
//! Services here compose the domain ports (traits) into the question
//! answering and indexing workflows. They never name a concrete adapter.

pub mod services;

pub use services::{
    AskError, AskService, ConversationMemory, IndexingService, IndexingSummary, PromptAssembler,
    RagService, RequestStage, DEFAULT_SESSION,
};
