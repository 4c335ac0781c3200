pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "http://127.0.0.1:1234";
/// Longest embedder input in characters; `chunk_size` may not exceed it.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;
pub const DEFAULT_DOCUMENT_SOURCE_PATH: &str = "./pdfs";
pub const DEFAULT_INDEX_STORE_PATH: &str = "./vector_db/index.sqlite";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_CONTEXT_TOKEN_BUDGET: usize = 3000;
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 1000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant answering questions about a collection of documents.
Instructions:
1. Use ONLY the information provided in the context to answer the question
2. If the context does not contain enough information, say so plainly
3. Cite the relevant document names when possible
4. If asked about something not in the context, explain that you can only answer based on the provided documents

Context from documents:
";
