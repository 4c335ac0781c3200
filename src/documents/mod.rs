//! Source documents and their normalized text.
//!
//! Extraction itself is delegated to a `DocumentExtractor`; this module only
//! owns the shape of an extracted document and the normalization rules that
//! every chunk offset is measured against.

mod extractor;

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use extractor::{
    discover_documents, CompositeExtractor, DocumentExtractor, PdfToTextExtractor,
    PlainTextExtractor,
};

/// Separator placed between normalized pages. It counts toward offsets and
/// is the only newline that can appear in normalized text.
pub const PAGE_BREAK: char = '\n';

/// Raw per-page text of one source file. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Source path, used as the document identifier
    pub id: String,
    pub pages: Vec<String>,
}

/// Normalized text of a document plus where each surviving page begins.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    pub id: String,
    pub text: String,
    /// `(page_number, char_offset)` for every non-empty page, 1-based pages
    pub page_starts: Vec<(u32, usize)>,
}

impl Document {
    pub fn new(path: &Path, pages: Vec<String>) -> Self {
        Self {
            id: path.to_string_lossy().to_string(),
            pages,
        }
    }

    /// File name without directories, for citations.
    pub fn display_name(&self) -> String {
        display_name(&self.id)
    }

    pub fn normalize(&self, min_line_chars: usize) -> NormalizedDocument {
        let mut text = String::new();
        let mut page_starts = Vec::new();
        let mut offset = 0usize;

        for (index, page) in self.pages.iter().enumerate() {
            let normalized = normalize_page(page, min_line_chars);
            if normalized.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(PAGE_BREAK);
                offset += 1;
            }
            page_starts.push((index as u32 + 1, offset));
            offset += normalized.chars().count();
            text.push_str(&normalized);
        }

        NormalizedDocument {
            id: self.id.clone(),
            text,
            page_starts,
        }
    }
}

impl NormalizedDocument {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Page containing the character at `offset`.
    pub fn page_at(&self, offset: usize) -> Option<u32> {
        self.page_starts
            .iter()
            .take_while(|(_, start)| *start <= offset)
            .last()
            .map(|(page, _)| *page)
    }
}

pub fn display_name(id: &str) -> String {
    Path::new(id)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| id.to_string())
}

fn whitespace_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Strip control characters, drop short lines, and collapse whitespace runs
/// to a single space.
pub fn normalize_page(raw: &str, min_line_chars: usize) -> String {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| {
            line.chars()
                .map(|c| if c.is_whitespace() { ' ' } else { c })
                .filter(|c| !c.is_control())
                .collect::<String>()
        })
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && line.chars().count() >= min_line_chars)
        .collect();

    whitespace_run()
        .replace_all(&lines.join(" "), " ")
        .trim()
        .to_string()
}
