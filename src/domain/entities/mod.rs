mod conversation;
mod document;
mod embedding;

pub use conversation::{Conversation, MessageRole, Turn};
pub use document::{Document, DocumentChunk, DocumentMetadata, SearchResult};
pub use embedding::Embedding;
