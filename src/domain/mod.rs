pub mod chunking;
pub mod entities;
pub mod errors;
pub mod ports;

pub use chunking::{split_documents, ChunkingConfig, TextSplitter};
pub use entities::*;
pub use errors::{DomainError, Result};
