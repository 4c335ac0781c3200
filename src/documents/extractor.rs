//! Document extraction backends.
//!
//! PDF text comes from poppler's `pdftotext`, which separates pages with a
//! form feed. Plain text and markdown files are read directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::Document;
use crate::core::errors::RagError;

const PAGE_SEPARATOR: char = '\u{000c}';

/// Turns a file on disk into per-page raw text.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Whether this backend handles `path` (usually by extension).
    fn supports(&self, path: &Path) -> bool;

    /// Extract raw pages; failures are `RagError::Extraction` for this file only.
    async fn extract(&self, path: &Path) -> Result<Document, RagError>;
}

pub struct PdfToTextExtractor {
    binary: PathBuf,
}

impl PdfToTextExtractor {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Find `pdftotext` on `PATH`.
    pub fn locate() -> Result<Self, RagError> {
        let binary = which::which("pdftotext").map_err(|e| {
            RagError::Config(format!(
                "pdftotext not found ({}); install poppler-utils to index PDFs",
                e
            ))
        })?;
        Ok(Self::new(binary))
    }
}

#[async_trait]
impl DocumentExtractor for PdfToTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["pdf"])
    }

    async fn extract(&self, path: &Path) -> Result<Document, RagError> {
        let output = Command::new(&self.binary)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .await
            .map_err(|e| RagError::extraction(path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RagError::extraction(
                path,
                format!("pdftotext exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Document::new(path, split_pages(&text)))
    }
}

pub struct PlainTextExtractor;

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "md"])
    }

    async fn extract(&self, path: &Path) -> Result<Document, RagError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::extraction(path, e))?;
        Ok(Document::new(path, split_pages(&text)))
    }
}

/// Dispatches to the first backend that supports a path.
#[derive(Clone, Default)]
pub struct CompositeExtractor {
    backends: Vec<Arc<dyn DocumentExtractor>>,
}

impl CompositeExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn DocumentExtractor>) -> Self {
        self.backends.push(backend);
        self
    }

    /// PDF support when `pdftotext` is installed, plain text always.
    pub fn detect() -> Self {
        let mut composite = Self::new();
        match PdfToTextExtractor::locate() {
            Ok(pdf) => composite = composite.with(Arc::new(pdf)),
            Err(e) => tracing::warn!("{}", e),
        }
        composite.with(Arc::new(PlainTextExtractor))
    }

    fn backend_for(&self, path: &Path) -> Option<&Arc<dyn DocumentExtractor>> {
        self.backends.iter().find(|b| b.supports(path))
    }
}

#[async_trait]
impl DocumentExtractor for CompositeExtractor {
    fn supports(&self, path: &Path) -> bool {
        self.backend_for(path).is_some()
    }

    async fn extract(&self, path: &Path) -> Result<Document, RagError> {
        match self.backend_for(path) {
            Some(backend) => backend.extract(path).await,
            None => Err(RagError::extraction(path, "unsupported file type")),
        }
    }
}

/// Supported files directly inside `dir`, sorted by path so runs are reproducible.
pub async fn discover_documents(
    dir: &Path,
    extractor: &dyn DocumentExtractor,
) -> Result<Vec<PathBuf>, RagError> {
    if !dir.is_dir() {
        return Err(RagError::Config(format!(
            "document directory '{}' does not exist",
            dir.display()
        )));
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && extractor.supports(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_SEPARATOR).map(str::to_string).collect();
    // pdftotext terminates the last page with a form feed too
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}
