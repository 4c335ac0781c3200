//! Retrieval pipeline.
//!
//! - `chunker`: fixed-window chunking of normalized document text
//! - `embedder`: text-to-vector capability with batching and input guards
//! - `index`: in-memory cosine-similarity index
//! - `store`: single-file SQLite persistence of the index
//! - `context_builder`: token-bounded context assembly
//! - `pipeline`: training and query orchestration

pub mod chunker;
pub mod context_builder;
pub mod embedder;
pub mod index;
pub mod pipeline;
mod store;

pub use chunker::{Chunk, Chunker};
pub use context_builder::{
    AssembledContext, CharsPerTokenEstimator, ContextAssembler, TokenEstimator,
    TokenizerEstimator,
};
pub use embedder::Embedder;
pub use index::{IndexEntry, IndexMetadata, IndexStats, RetrievedChunk, VectorIndex};
pub use pipeline::{
    ChunkPreview, DocumentOutcome, DocumentStatus, QueryAnswer, RagPipeline, TrainingReport,
    NO_MATCH_ANSWER,
};
