pub mod openai;
pub mod prompt;
pub mod provider;
pub mod types;

pub use openai::{OpenAiCompatibleCompleter, OpenAiCompatibleEmbedder};
pub use provider::Completer;
pub use types::{ChatMessage, ChatRequest, Completion, TokenUsage};
