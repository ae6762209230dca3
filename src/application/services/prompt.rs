use crate::domain::{DocumentChunk, MessageRole, Turn};

pub const DEFAULT_PREAMBLE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise. \
Reason step by step using ONLY the provided context and the chat history, then give the final answer.";

const NO_CONTEXT: &str = "(no relevant context was found)";

/// Prompt split into the system instruction and the user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub struct PromptAssembler {
    preamble: String,
    max_history_turns: usize,
}

impl PromptAssembler {
    pub fn new(preamble: impl Into<String>, max_history_turns: usize) -> Self {
        Self {
            preamble: preamble.into(),
            max_history_turns,
        }
    }

    /// Preamble and context go to the system message; the most recent
    /// `max_history_turns` turns and the question go to the user message.
    pub fn assemble(&self, chunks: &[DocumentChunk], history: &[Turn], question: &str) -> Prompt {
        let context = if chunks.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            chunks
                .iter()
                .map(|c| c.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let system = format!("{}\n\nCONTEXT:\n{}", self.preamble, context);

        let start = history.len().saturating_sub(self.max_history_turns);
        let window = &history[start..];

        let mut user = String::new();
        if !window.is_empty() {
            let lines = window
                .iter()
                .flat_map(|t| {
                    [
                        format!("{}: {}", MessageRole::User.as_str(), t.question),
                        format!("{}: {}", MessageRole::Assistant.as_str(), t.answer),
                    ]
                })
                .collect::<Vec<_>>()
                .join("\n");
            user.push_str("CHAT HISTORY:\n");
            user.push_str(&lines);
            user.push_str("\n\n");
        }
        user.push_str("QUESTION:\n");
        user.push_str(question);
        user.push_str("\n\nFinal answer:");

        Prompt { system, user }
    }
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_PREAMBLE, 10)
    }
}
