use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("failed to extract text from {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error(
        "index was built with model '{stored_model}' ({stored_dimension} dims) \
         but the embedder is '{expected_model}' ({expected_dimension} dims); rebuild with --force"
    )]
    IncompatibleIndex {
        stored_model: String,
        stored_dimension: usize,
        expected_model: String,
        expected_dimension: usize,
    },
    #[error("no database found: {0}")]
    EmptyIndex(String),
    #[error("index store is corrupt: {0}")]
    CorruptStore(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("completion failed: {0}")]
    Completion(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn extraction<E: std::fmt::Display>(path: impl Into<PathBuf>, err: E) -> Self {
        RagError::Extraction {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    pub fn corrupt<E: std::fmt::Display>(err: E) -> Self {
        RagError::CorruptStore(err.to_string())
    }

    pub fn completion<E: std::fmt::Display>(err: E) -> Self {
        RagError::Completion(err.to_string())
    }

    /// Structural failures that would make retrieval silently wrong if ignored.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RagError::DimensionMismatch { .. }
                | RagError::IncompatibleIndex { .. }
                | RagError::CorruptStore(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_are_fatal() {
        assert!(RagError::DimensionMismatch { expected: 3, actual: 4 }.is_fatal());
        assert!(RagError::corrupt("bad checksum").is_fatal());
        assert!(!RagError::EmptyIndex("missing".to_string()).is_fatal());
        assert!(!RagError::extraction("a.pdf", "encrypted").is_fatal());
    }

    #[test]
    fn empty_index_reads_as_no_database() {
        let err = RagError::EmptyIndex("./vector_db/index.sqlite".to_string());
        assert!(err.to_string().starts_with("no database found"));
    }
}
