//! Training and query orchestration.
//!
//! Training: discover → extract → chunk → embed → build/add → persist.
//! Querying: embed question → search → assemble context → complete.
//!
//! The pipeline owns no index state between calls. Training loads or creates
//! the index, mutates a private copy and persists it; queries borrow an index
//! the caller loaded once and never write to it.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::chunker::{Chunk, Chunker};
use super::context_builder::{estimator_from_config, AssembledContext, ContextAssembler};
use super::embedder::Embedder;
use super::index::{IndexEntry, IndexMetadata, IndexStats, RetrievedChunk, VectorIndex};
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::documents::{discover_documents, display_name, DocumentExtractor};
use crate::llm::prompt::build_prompt;
use crate::llm::{Completer, TokenUsage};

pub const NO_MATCH_ANSWER: &str =
    "I couldn't find any relevant information in the documents to answer your question.";

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Indexed { chunks: usize },
    AlreadyIndexed,
    /// Extracted, but no text survived normalization
    Empty,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub document: String,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub outcomes: Vec<DocumentOutcome>,
    /// The index was replaced rather than extended
    pub rebuilt: bool,
    pub stats: IndexStats,
}

impl TrainingReport {
    pub fn indexed_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Indexed { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed { .. }))
    }

    pub fn new_chunks(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.status {
                DocumentStatus::Indexed { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, predicate: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub answer: String,
    /// Everything the search returned, including chunks left out of the context
    pub retrieved: Vec<RetrievedChunk>,
    pub context: AssembledContext,
    pub sources: Vec<String>,
    pub usage: Option<TokenUsage>,
}

impl QueryAnswer {
    fn no_match() -> Self {
        Self {
            answer: NO_MATCH_ANSWER.to_string(),
            retrieved: Vec::new(),
            context: AssembledContext::default(),
            sources: Vec::new(),
            usage: None,
        }
    }

    /// Chunks placed in the prompt per source file, in rank order.
    pub fn chunks_per_source(&self) -> Vec<(String, usize)> {
        self.context.source_counts()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkPreview {
    pub chunk_id: String,
    pub document: String,
    pub page: Option<u32>,
    pub chars: usize,
    pub preview: String,
}

impl ChunkPreview {
    fn from_chunk(chunk: &Chunk) -> Self {
        let mut preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
        if chunk.char_len() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        Self {
            chunk_id: chunk.chunk_id.clone(),
            document: display_name(&chunk.source_document),
            page: chunk.page,
            chars: chunk.char_len(),
            preview,
        }
    }
}

pub struct RagPipeline {
    config: RagConfig,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn DocumentExtractor>,
    assembler: ContextAssembler,
}

impl RagPipeline {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn DocumentExtractor>,
    ) -> Result<Self, RagError> {
        let chunker = Chunker::from_config(&config)?;
        let assembler = ContextAssembler::new(estimator_from_config(&config));
        Ok(Self {
            config,
            chunker,
            embedder,
            extractor,
            assembler,
        })
    }

    pub fn with_assembler(mut self, assembler: ContextAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store_path(&self) -> &Path {
        &self.config.index_store_path
    }

    /// Build or extend the index from `document_source_path` and persist it.
    ///
    /// With `force_rebuild`, or when no store exists yet, every document is
    /// re-indexed and the index replaced. Otherwise only documents not yet in
    /// the index are embedded and appended, which requires the stored chunk
    /// settings to match the current ones. Unreadable documents are reported
    /// and skipped; embedding and structural failures abort the run and leave
    /// the stored index untouched.
    pub async fn train(&self) -> Result<TrainingReport, RagError> {
        let source_dir = &self.config.document_source_path;
        let paths = discover_documents(source_dir, self.extractor.as_ref()).await?;
        tracing::info!("Found {} documents in {}", paths.len(), source_dir.display());

        let store_path = self.store_path();
        let rebuild = self.config.force_rebuild || !store_path.is_file();
        let mut index = if rebuild {
            tracing::info!("Building a new index at {}", store_path.display());
            VectorIndex::new(IndexMetadata::new(
                self.embedder.model_name(),
                self.embedder.dimension(),
                self.chunker.chunk_size(),
                self.chunker.chunk_overlap(),
            ))
        } else {
            let index = self.open_index().await?;
            self.ensure_same_chunking(index.metadata())?;
            index
        };

        let mut outcomes = Vec::with_capacity(paths.len());
        let mut pending = Vec::new();
        let mut added = 0usize;

        for path in &paths {
            let document = path.to_string_lossy().to_string();

            if !rebuild && index.contains_document(&document) {
                tracing::debug!("{} is already indexed", document);
                outcomes.push(DocumentOutcome {
                    document,
                    status: DocumentStatus::AlreadyIndexed,
                });
                continue;
            }

            let chunks = match self.extract_and_chunk(path).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", document, e);
                    outcomes.push(DocumentOutcome {
                        document,
                        status: DocumentStatus::Failed {
                            reason: e.to_string(),
                        },
                    });
                    continue;
                }
            };
            if chunks.is_empty() {
                outcomes.push(DocumentOutcome {
                    document,
                    status: DocumentStatus::Empty,
                });
                continue;
            }

            let entries = self.embed_chunks(chunks).await?;
            let count = entries.len();
            if rebuild {
                pending.extend(entries);
            } else {
                index.add(entries)?;
            }
            added += count;

            tracing::info!("Indexed {} ({} chunks)", document, count);
            outcomes.push(DocumentOutcome {
                document,
                status: DocumentStatus::Indexed { chunks: count },
            });
        }

        if rebuild {
            index.build(pending)?;
        }
        if rebuild || added > 0 {
            index.persist(store_path).await?;
        } else {
            tracing::info!("No new documents; index left unchanged");
        }

        let report = TrainingReport {
            outcomes,
            rebuilt: rebuild,
            stats: index.stats(Some(store_path.to_path_buf())),
        };
        tracing::info!(
            "Training finished: {} indexed, {} failed, {} chunks total",
            report.indexed_count(),
            report.failed_count(),
            report.stats.total_chunks
        );
        Ok(report)
    }

    /// Load the persisted index, failing unless it matches this pipeline's embedder.
    pub async fn open_index(&self) -> Result<VectorIndex, RagError> {
        VectorIndex::load_compatible(
            self.store_path(),
            self.embedder.model_name(),
            self.embedder.dimension(),
        )
        .await
    }

    /// Statistics of the persisted index. Read-only.
    pub async fn info(&self) -> Result<IndexStats, RagError> {
        let path = self.store_path();
        let index = VectorIndex::load(path).await?;
        Ok(index.stats(Some(path.to_path_buf())))
    }

    /// The first `max_chunks` chunks, optionally only those of one document
    /// (matched by file name or full id).
    pub fn preview(
        &self,
        index: &VectorIndex,
        filename: Option<&str>,
        max_chunks: usize,
    ) -> Vec<ChunkPreview> {
        index
            .chunks()
            .iter()
            .filter(|chunk| match filename {
                Some(name) => {
                    chunk.source_document == name || display_name(&chunk.source_document) == name
                }
                None => true,
            })
            .take(max_chunks)
            .map(ChunkPreview::from_chunk)
            .collect()
    }

    /// Ranked chunks for `question`, without calling the language model.
    pub async fn retrieve(
        &self,
        index: &VectorIndex,
        question: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::Config("question is empty".to_string()));
        }
        index.ensure_compatible(self.embedder.model_name(), self.embedder.dimension())?;

        let query = self.embedder.embed_one(question).await?;
        let mut hits = index.search(&query, k)?;
        if let Some(floor) = self.config.min_similarity {
            hits.retain(|hit| hit.score >= floor);
        }
        Ok(hits)
    }

    /// Retrieve, assemble a context within the token budget, and ask `completer`.
    ///
    /// When nothing relevant is retrieved the fixed no-match answer is
    /// returned and `completer` is not called.
    pub async fn query(
        &self,
        index: &VectorIndex,
        completer: &dyn Completer,
        question: &str,
        k: usize,
    ) -> Result<QueryAnswer, RagError> {
        let retrieved = self.retrieve(index, question, k).await?;
        if retrieved.is_empty() {
            return Ok(QueryAnswer::no_match());
        }

        let context = self.assembler.assemble(&retrieved, self.context_budget(question));
        tracing::debug!(
            "Asking {} with {} of {} retrieved chunks",
            completer.model_name(),
            context.chunks.len(),
            retrieved.len()
        );

        let completion = completer.complete(&context.render(), question).await?;
        let sources = context.sources();
        Ok(QueryAnswer {
            answer: completion.text,
            retrieved,
            context,
            sources,
            usage: completion.usage,
        })
    }

    /// Token budget left for document sections once the prompt around them
    /// (instructions, question and answer cue) is accounted for.
    fn context_budget(&self, question: &str) -> usize {
        let scaffold = build_prompt(self.config.system_prompt(), "", question);
        let fixed = self.assembler.estimator().estimate(&scaffold);
        self.config.context_token_budget.saturating_sub(fixed)
    }

    async fn extract_and_chunk(&self, path: &Path) -> Result<Vec<Chunk>, RagError> {
        let document = self.extractor.extract(path).await?;
        Ok(self.chunker.chunk(&document))
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>, RagError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry::new(chunk, vector))
            .collect())
    }

    /// Appending chunks cut differently would leave the stored chunk settings
    /// describing only part of the index.
    fn ensure_same_chunking(&self, stored: &IndexMetadata) -> Result<(), RagError> {
        if stored.chunk_size == self.chunker.chunk_size()
            && stored.chunk_overlap == self.chunker.chunk_overlap()
        {
            return Ok(());
        }
        Err(RagError::Config(format!(
            "index was chunked with size {}/overlap {} but the current settings are {}/{}; rebuild with --force",
            stored.chunk_size,
            stored.chunk_overlap,
            self.chunker.chunk_size(),
            self.chunker.chunk_overlap()
        )))
    }
}
