//! Build a searchable knowledge base from a folder of documents and answer
//! questions over it with retrieval-augmented generation.

pub mod core;
pub mod documents;
pub mod llm;
pub mod rag;
pub mod vector_math;

pub use crate::core::config::RagConfig;
pub use crate::core::errors::RagError;
pub use crate::rag::{RagPipeline, VectorIndex};
