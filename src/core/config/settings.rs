use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Every tunable of the training and query flows.
///
/// Built once by `ConfigService` and handed to each component at
/// construction; nothing reads process-wide state after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks, strictly below `chunk_size`
    pub chunk_overlap: usize,
    /// Lines shorter than this are dropped during normalization (0 keeps all)
    pub min_line_chars: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub embedding_base_url: String,
    pub embedding_batch_size: usize,
    /// Longest text the embedder accepts; longer inputs are rejected
    pub max_input_chars: usize,
    pub document_source_path: PathBuf,
    pub index_store_path: PathBuf,
    pub top_k: usize,
    /// Hits scoring below this cosine similarity are dropped before assembly
    pub min_similarity: Option<f32>,
    pub force_rebuild: bool,
    pub context_token_budget: usize,
    pub completion_model: String,
    pub completion_base_url: String,
    pub temperature: f64,
    pub max_completion_tokens: u32,
    pub system_prompt: Option<String>,
    /// HuggingFace `tokenizer.json` used for token estimates when present
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            min_line_chars: 0,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            document_source_path: PathBuf::from(DEFAULT_DOCUMENT_SOURCE_PATH),
            index_store_path: PathBuf::from(DEFAULT_INDEX_STORE_PATH),
            top_k: DEFAULT_TOP_K,
            min_similarity: None,
            force_rebuild: false,
            context_token_budget: DEFAULT_CONTEXT_TOKEN_BUDGET,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            completion_base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_completion_tokens: DEFAULT_MAX_COMPLETION_TOKENS,
            system_prompt: None,
            tokenizer_path: None,
        }
    }
}

impl RagConfig {
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}
