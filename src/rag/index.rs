//! In-memory vector index over unit-length embeddings.
//!
//! Rows are append-only: row ids are positions and never change until a
//! full `build` replaces the whole aggregate. Chunk metadata and the vector
//! matrix always have the same number of rows.

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ndarray::{concatenate, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use super::chunker::Chunk;
use crate::core::errors::RagError;
use crate::vector_math::{inner_products, l2_normalize, normalized, rank_descending};

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// A chunk and its embedding, as handed to `build` or `add`.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_count: usize,
}

impl IndexMetadata {
    pub fn new(
        embedding_model: impl Into<String>,
        dimension: usize,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let now = Utc::now();
        Self {
            format_version: INDEX_FORMAT_VERSION,
            embedding_model: embedding_model.into(),
            dimension,
            chunk_size,
            chunk_overlap,
            created_at: now,
            updated_at: now,
            document_count: 0,
        }
    }
}

/// One search hit. `rank` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub row_id: usize,
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

/// Summary reported by `info` and after training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    metadata: IndexMetadata,
    chunks: Vec<Chunk>,
    vectors: Array2<f32>,
}

impl VectorIndex {
    pub fn new(metadata: IndexMetadata) -> Self {
        let dimension = metadata.dimension;
        Self {
            metadata,
            chunks: Vec::new(),
            vectors: Array2::zeros((0, dimension)),
        }
    }

    /// Reassemble an index from persisted parts. `vectors` is row-major and
    /// already unit-length.
    pub(crate) fn from_parts(
        metadata: IndexMetadata,
        chunks: Vec<Chunk>,
        vectors: Vec<f32>,
    ) -> Result<Self, RagError> {
        let rows = chunks.len();
        let vectors = Array2::from_shape_vec((rows, metadata.dimension), vectors).map_err(|e| {
            RagError::corrupt(format!(
                "{} chunks do not align with stored vectors: {}",
                rows, e
            ))
        })?;
        Ok(Self {
            metadata,
            chunks,
            vectors,
        })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn dimension(&self) -> usize {
        self.metadata.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks in row-id order.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vector(&self, row_id: usize) -> Option<ArrayView1<'_, f32>> {
        (row_id < self.len()).then(|| self.vectors.row(row_id))
    }

    pub(crate) fn matrix(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn sources(&self) -> BTreeSet<&str> {
        self.chunks
            .iter()
            .map(|c| c.source_document.as_str())
            .collect()
    }

    pub fn contains_document(&self, document_id: &str) -> bool {
        self.chunks.iter().any(|c| c.source_document == document_id)
    }

    /// Fails with `IncompatibleIndex` when this index was built by another model.
    pub fn ensure_compatible(&self, embedding_model: &str, dimension: usize) -> Result<(), RagError> {
        if self.metadata.embedding_model != embedding_model || self.metadata.dimension != dimension {
            return Err(RagError::IncompatibleIndex {
                stored_model: self.metadata.embedding_model.clone(),
                stored_dimension: self.metadata.dimension,
                expected_model: embedding_model.to_string(),
                expected_dimension: dimension,
            });
        }
        Ok(())
    }

    /// Replace every row. On error the current contents are untouched.
    pub fn build(&mut self, entries: Vec<IndexEntry>) -> Result<(), RagError> {
        let (chunks, vectors) = self.prepare(entries)?;

        let now = Utc::now();
        self.chunks = chunks;
        self.vectors = vectors;
        self.metadata.created_at = now;
        self.metadata.updated_at = now;
        self.metadata.document_count = self.sources().len();

        tracing::info!("Built index with {} vectors", self.len());
        Ok(())
    }

    /// Append rows after the existing ones. On error nothing is appended.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<(), RagError> {
        if entries.is_empty() {
            return Ok(());
        }
        let (chunks, vectors) = self.prepare(entries)?;
        let combined = concatenate(Axis(0), &[self.vectors.view(), vectors.view()])
            .map_err(|_| RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: vectors.ncols(),
            })?;

        self.vectors = combined;
        self.chunks.extend(chunks);
        self.metadata.updated_at = Utc::now();
        self.metadata.document_count = self.sources().len();

        tracing::info!("Index now contains {} vectors", self.len());
        Ok(())
    }

    /// The `k` rows most similar to `query`, best first. Equal scores are
    /// ordered by ascending row id; `k` is clamped to the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        if self.is_empty() {
            return Err(RagError::EmptyIndex("the index has no entries".to_string()));
        }
        if query.len() != self.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let query = normalized(query);
        let scores = inner_products(&self.vectors, &query).to_vec();
        let ranked = rank_descending(&scores, k.min(self.len()));

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(position, (row_id, score))| RetrievedChunk {
                row_id,
                chunk: self.chunks[row_id].clone(),
                score,
                rank: position + 1,
            })
            .collect())
    }

    pub fn stats(&self, store_path: Option<PathBuf>) -> IndexStats {
        IndexStats {
            total_documents: self.sources().len(),
            total_chunks: self.len(),
            embedding_model: self.metadata.embedding_model.clone(),
            embedding_dimension: self.metadata.dimension,
            chunk_size: self.metadata.chunk_size,
            chunk_overlap: self.metadata.chunk_overlap,
            created_at: self.metadata.created_at,
            updated_at: self.metadata.updated_at,
            store_path,
        }
    }

    /// Validate and normalize entries into a detached (chunks, matrix) pair.
    fn prepare(&self, entries: Vec<IndexEntry>) -> Result<(Vec<Chunk>, Array2<f32>), RagError> {
        let dimension = self.dimension();
        let rows = entries.len();
        let mut chunks = Vec::with_capacity(rows);
        let mut flat = Vec::with_capacity(rows * dimension);

        for entry in entries {
            if entry.embedding.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.embedding.len(),
                });
            }
            if entry.embedding.iter().any(|x| !x.is_finite()) {
                return Err(RagError::Embedding(format!(
                    "embedding for {} contains non-finite values",
                    entry.chunk.chunk_id
                )));
            }
            let mut vector = entry.embedding;
            l2_normalize(&mut vector);
            flat.extend(vector);
            chunks.push(entry.chunk);
        }

        let matrix = Array2::from_shape_vec((rows, dimension), flat)
            .map_err(|e| RagError::Embedding(format!("could not assemble vectors: {}", e)))?;
        Ok((chunks, matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, source: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{}#{}", source, id),
            text: format!("chunk {}", id),
            source_document: source.to_string(),
            chunk_index: id,
            start_offset: id * 10,
            end_offset: id * 10 + 7,
            page: Some(1),
        }
    }

    fn index_with(vectors: &[[f32; 3]]) -> VectorIndex {
        let mut index = VectorIndex::new(IndexMetadata::new("test-model", 3, 500, 50));
        let entries = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| IndexEntry::new(chunk(i, "doc.pdf"), v.to_vec()))
            .collect();
        index.build(entries).unwrap();
        index
    }

    #[test]
    fn empty_index_search_is_an_empty_index_error() {
        let index = VectorIndex::new(IndexMetadata::new("test-model", 3, 500, 50));
        let err = index.search(&[1.0, 0.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex(_)));
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let index = index_with(&[[0.0, 1.0, 0.0], [2.0, 0.1, 0.0], [0.5, 0.5, 0.0]]);
        let results = index.search(&[1.0, 0.0, 0.0], 3).unwrap();

        let rows: Vec<_> = results.iter().map(|r| r.row_id).collect();
        assert_eq!(rows, vec![1, 2, 0]);
        assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn stored_vectors_are_unit_length() {
        let index = index_with(&[[3.0, 4.0, 0.0]]);
        let row = index.vector(0).unwrap();
        let norm: f32 = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!(index.vector(1).is_none());
    }

    #[test]
    fn k_is_clamped_to_index_size() {
        let index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        assert_eq!(index.search(&[1.0, 1.0, 0.0], 10).unwrap().len(), 2);
        assert!(index.search(&[1.0, 1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = index_with(&[[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results[0].row_id, 1);
        assert_eq!(results[1].row_id, 2);
    }

    #[test]
    fn repeated_searches_are_identical() {
        let index = index_with(&[[0.3, 0.2, 0.1], [0.1, 0.9, 0.4], [0.7, 0.7, 0.7]]);
        let first = index.search(&[0.2, 0.5, 0.1], 2).unwrap();
        let second = index.search(&[0.2, 0.5, 0.1], 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn add_appends_without_moving_existing_rows() {
        let mut index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        index
            .add(vec![IndexEntry::new(chunk(0, "other.pdf"), vec![0.0, 0.0, 1.0])])
            .unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.chunks()[0].source_document, "doc.pdf");
        assert_eq!(index.chunks()[2].source_document, "other.pdf");
        assert_eq!(index.metadata().document_count, 2);
        assert_eq!(index.search(&[0.0, 0.0, 1.0], 1).unwrap()[0].row_id, 2);
    }

    #[test]
    fn add_with_wrong_dimension_leaves_index_unchanged() {
        let mut index = index_with(&[[1.0, 0.0, 0.0]]);
        let err = index
            .add(vec![
                IndexEntry::new(chunk(1, "doc.pdf"), vec![0.0, 1.0, 0.0]),
                IndexEntry::new(chunk(2, "doc.pdf"), vec![0.0, 1.0]),
            ])
            .unwrap_err();

        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
        assert_eq!(index.len(), 1);
        assert_eq!(index.matrix().nrows(), 1);
    }

    #[test]
    fn failed_build_keeps_previous_contents() {
        let mut index = index_with(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let err = index.build(vec![IndexEntry::new(chunk(0, "new.pdf"), vec![1.0; 4])]);
        assert!(err.is_err());
        assert_eq!(index.len(), 2);
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_ok());
    }

    #[test]
    fn non_finite_embeddings_are_rejected() {
        let mut index = VectorIndex::new(IndexMetadata::new("test-model", 3, 500, 50));
        let err = index
            .add(vec![IndexEntry::new(chunk(0, "doc.pdf"), vec![f32::NAN, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn query_dimension_is_checked() {
        let index = index_with(&[[1.0, 0.0, 0.0]]);
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn compatibility_check_compares_model_and_dimension() {
        let index = index_with(&[[1.0, 0.0, 0.0]]);
        assert!(index.ensure_compatible("test-model", 3).is_ok());
        assert!(matches!(
            index.ensure_compatible("other-model", 3),
            Err(RagError::IncompatibleIndex { .. })
        ));
        assert!(matches!(
            index.ensure_compatible("test-model", 384),
            Err(RagError::IncompatibleIndex { .. })
        ));
    }
}
