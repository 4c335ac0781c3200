//! Fixed-window chunking over normalized document text.
//!
//! Windows are exactly `chunk_size` characters and advance by
//! `chunk_size - chunk_overlap`, so consecutive chunks share exactly
//! `chunk_overlap` characters. Only the final window may be shorter.
//! Offsets count characters, not bytes.

use serde::{Deserialize, Serialize};

use crate::core::config::validation::validate_chunking;
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::documents::{Document, NormalizedDocument};

/// A window of normalized document text with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<document id>#<chunk index>`, stable across rebuilds of the same text
    pub chunk_id: String,
    pub text: String,
    pub source_document: String,
    /// Position within the source document
    pub chunk_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    /// Page on which the chunk starts
    pub page: Option<u32>,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

pub fn chunk_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}#{}", document_id, chunk_index)
}

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_line_chars: usize,
}

impl Chunker {
    /// Fails with `RagError::Config` unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        validate_chunking(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            min_line_chars: 0,
        })
    }

    pub fn from_config(config: &RagConfig) -> Result<Self, RagError> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?
            .with_min_line_chars(config.min_line_chars))
    }

    pub fn with_min_line_chars(mut self, min_line_chars: usize) -> Self {
        self.min_line_chars = min_line_chars;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Normalize and chunk a document. A document with no text left after
    /// normalization yields no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let normalized = document.normalize(self.min_line_chars);
        if normalized.is_empty() {
            tracing::warn!("{} has no text after normalization; skipping", document.id);
            return Vec::new();
        }
        self.chunk_normalized(&normalized)
    }

    pub fn chunk_normalized(&self, document: &NormalizedDocument) -> Vec<Chunk> {
        let chars: Vec<char> = document.text.chars().collect();
        let total_chars = chars.len();
        let mut chunks = Vec::new();

        if total_chars == 0 {
            return chunks;
        }

        let step = self.chunk_size - self.chunk_overlap;
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(total_chars);
            let chunk_index = chunks.len();

            chunks.push(Chunk {
                chunk_id: chunk_id(&document.id, chunk_index),
                text: chars[start..end].iter().collect(),
                source_document: document.id.clone(),
                chunk_index,
                start_offset: start,
                end_offset: end,
                page: document.page_at(start),
            });

            if end == total_chars {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(text: &str) -> NormalizedDocument {
        NormalizedDocument {
            id: "doc.pdf".to_string(),
            text: text.to_string(),
            page_starts: vec![(1, 0)],
        }
    }

    fn sample_text(len: usize) -> String {
        "abcdefghijklmnopqrstuvwxyz0123456789"
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let skip = if i == 0 { 0 } else { overlap };
            out.extend(chunk.text.chars().skip(skip));
        }
        out
    }

    #[test]
    fn overlap_must_be_below_chunk_size() {
        assert!(matches!(Chunker::new(100, 100), Err(RagError::Config(_))));
        assert!(matches!(Chunker::new(0, 0), Err(RagError::Config(_))));
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.chunk_normalized(&normalized("tiny text"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny text");
        assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 9));
    }

    #[test]
    fn chunks_reassemble_to_the_original_text() {
        for (size, overlap, len) in [(10, 3, 95), (7, 0, 50), (5, 4, 23), (500, 50, 1234)] {
            let text = sample_text(len);
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk_normalized(&normalized(&text));
            assert_eq!(reassemble(&chunks, overlap), text, "size={size} overlap={overlap}");
        }
    }

    #[test]
    fn adjacent_chunks_share_exactly_the_overlap() {
        let text = sample_text(200);
        let chunker = Chunker::new(30, 8).unwrap();
        let chunks = chunker.chunk_normalized(&normalized(&text));

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(pair[0].char_len() - 8).collect();
            let head: String = pair[1].text.chars().take(8).collect();
            assert_eq!(tail, head);
            assert_eq!(pair[1].start_offset, pair[0].end_offset - 8);
        }
    }

    #[test]
    fn offsets_match_text_length_in_chars() {
        let text = "héllo wörld ünïcode ".repeat(20);
        let chunker = Chunker::new(17, 4).unwrap();
        for chunk in chunker.chunk_normalized(&normalized(text.trim())) {
            assert_eq!(chunk.text.chars().count(), chunk.end_offset - chunk.start_offset);
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn exact_multiple_does_not_emit_a_trailing_overlap_only_chunk() {
        // 950 = 500 + 450: second window ends exactly at the text end
        let chunker = Chunker::new(500, 50).unwrap();
        let chunks = chunker.chunk_normalized(&normalized(&sample_text(950)));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].end_offset, 950);
    }

    #[test]
    fn chunk_ids_are_stable_and_sequential() {
        let chunker = Chunker::new(10, 2).unwrap();
        let chunks = chunker.chunk_normalized(&normalized(&sample_text(30)));
        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["doc.pdf#0", "doc.pdf#1", "doc.pdf#2", "doc.pdf#3"]);
    }

    #[test]
    fn chunks_record_their_starting_page() {
        let doc = Document {
            id: "book.pdf".to_string(),
            pages: vec!["a".repeat(12), "b".repeat(12)],
        };
        let chunker = Chunker::new(10, 0).unwrap();
        let chunks = chunker.chunk(&doc);
        let pages: Vec<_> = chunks.iter().map(|c| c.page).collect();
        // text is 12 a's, a break, 12 b's
        assert_eq!(pages, vec![Some(1), Some(1), Some(2)]);
    }

    #[test]
    fn empty_document_is_skipped() {
        let doc = Document {
            id: "blank.pdf".to_string(),
            pages: vec!["   ".to_string()],
        };
        assert!(Chunker::new(10, 2).unwrap().chunk(&doc).is_empty());
    }
}
