//! Token-bounded context assembly.
//!
//! Retrieved chunks are taken greedily in rank order until the next one would
//! overflow the token budget. The top-ranked chunk is always kept, even when
//! it alone is over budget; that case sets `truncated`.
//!
//! Each chunk is charged for its rendered section, header and separating
//! newline included, so `total_tokens` bounds the context block as it
//! appears in the prompt.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokenizers::Tokenizer;

use super::index::RetrievedChunk;
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::documents::display_name;

/// Deterministic token count for a piece of text.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Rough heuristic: one token per `chars_per_token` characters, rounded up.
#[derive(Debug, Clone, Copy)]
pub struct CharsPerTokenEstimator {
    chars_per_token: usize,
}

impl CharsPerTokenEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharsPerTokenEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharsPerTokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Exact counts from a HuggingFace `tokenizer.json`.
pub struct TokenizerEstimator {
    tokenizer: Tokenizer,
    fallback: CharsPerTokenEstimator,
}

impl TokenizerEstimator {
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            RagError::Config(format!("cannot load tokenizer {}: {}", path.display(), e))
        })?;
        Ok(Self {
            tokenizer,
            fallback: CharsPerTokenEstimator::default(),
        })
    }
}

impl TokenEstimator for TokenizerEstimator {
    fn estimate(&self, text: &str) -> usize {
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                tracing::debug!("Tokenizer failed ({}); using heuristic count", e);
                self.fallback.estimate(text)
            }
        }
    }
}

/// The tokenizer named in the config if it loads, the heuristic otherwise.
pub fn estimator_from_config(config: &RagConfig) -> Arc<dyn TokenEstimator> {
    if let Some(path) = &config.tokenizer_path {
        match TokenizerEstimator::from_file(path) {
            Ok(estimator) => return Arc::new(estimator),
            Err(e) => tracing::warn!("{}; falling back to 4 chars per token", e),
        }
    }
    Arc::new(CharsPerTokenEstimator::default())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledContext {
    /// Included chunks, in their original rank order
    pub chunks: Vec<RetrievedChunk>,
    pub total_tokens: usize,
    /// The single included chunk is larger than the budget on its own
    pub truncated: bool,
    /// Retrieved chunks left out for lack of budget
    pub omitted: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Source file names in rank order of first appearance.
    pub fn sources(&self) -> Vec<String> {
        self.source_counts().into_iter().map(|(name, _)| name).collect()
    }

    /// Included chunks per source file, in rank order of first appearance.
    pub fn source_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for item in &self.chunks {
            let name = display_name(&item.chunk.source_document);
            match counts.iter_mut().find(|(seen, _)| *seen == name) {
                Some((_, count)) => *count += 1,
                None => counts.push((name, 1)),
            }
        }
        counts
    }

    /// Context block for the prompt, one section per chunk.
    pub fn render(&self) -> String {
        self.chunks
            .iter()
            .map(section)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn section(item: &RetrievedChunk) -> String {
    format!(
        "--- From {} ---\n{}\n",
        display_name(&item.chunk.source_document),
        item.chunk.text
    )
}

pub struct ContextAssembler {
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextAssembler {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { estimator }
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    pub fn assemble(&self, retrieved: &[RetrievedChunk], token_budget: usize) -> AssembledContext {
        let mut context = AssembledContext::default();

        for (position, item) in retrieved.iter().enumerate() {
            // the leading newline is the separator before this section
            let tokens = self.estimator.estimate(&format!("\n{}", section(item)));

            if position == 0 && tokens > token_budget {
                tracing::warn!(
                    "Top chunk {} needs {} tokens, budget is {}",
                    item.chunk.chunk_id,
                    tokens,
                    token_budget
                );
                context.chunks.push(item.clone());
                context.total_tokens = tokens;
                context.truncated = true;
                break;
            }
            if context.total_tokens + tokens > token_budget {
                break;
            }

            context.chunks.push(item.clone());
            context.total_tokens += tokens;
        }

        context.omitted = retrieved.len() - context.chunks.len();
        tracing::debug!(
            "Assembled {} chunks ({} tokens, {} omitted)",
            context.chunks.len(),
            context.total_tokens,
            context.omitted
        );
        context
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(Arc::new(CharsPerTokenEstimator::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::chunker::Chunk;

    /// One token per character.
    struct CharTokens;

    impl TokenEstimator for CharTokens {
        fn estimate(&self, text: &str) -> usize {
            text.chars().count()
        }
    }

    /// Counts only the `x` payload so budgets below ignore section framing.
    struct PayloadTokens;

    impl TokenEstimator for PayloadTokens {
        fn estimate(&self, text: &str) -> usize {
            text.chars().filter(|c| *c == 'x').count()
        }
    }

    fn retrieved(lengths: &[usize]) -> Vec<RetrievedChunk> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| RetrievedChunk {
                row_id: i,
                chunk: Chunk {
                    chunk_id: format!("docs/file{}.pdf#0", i % 2),
                    text: "x".repeat(len),
                    source_document: format!("docs/file{}.pdf", i % 2),
                    chunk_index: 0,
                    start_offset: 0,
                    end_offset: len,
                    page: Some(1),
                },
                score: 1.0 - i as f32 * 0.1,
                rank: i + 1,
            })
            .collect()
    }

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(Arc::new(PayloadTokens))
    }

    #[test]
    fn chars_per_token_rounds_up() {
        let estimator = CharsPerTokenEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
        assert_eq!(estimator.estimate("ééééé"), 2);
    }

    #[test]
    fn empty_input_gives_empty_context() {
        let context = assembler().assemble(&[], 100);
        assert!(context.is_empty());
        assert!(!context.truncated);
        assert_eq!(context.total_tokens, 0);
    }

    #[test]
    fn greedy_fill_stops_before_overflow() {
        let context = assembler().assemble(&retrieved(&[40, 30, 50, 10]), 100);
        let ranks: Vec<_> = context.chunks.iter().map(|c| c.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(context.total_tokens, 70);
        assert_eq!(context.omitted, 2);
        assert!(!context.truncated);
    }

    #[test]
    fn exact_fit_is_included() {
        let context = assembler().assemble(&retrieved(&[60, 40]), 100);
        assert_eq!(context.chunks.len(), 2);
        assert_eq!(context.total_tokens, 100);
    }

    #[test]
    fn oversized_top_chunk_is_kept_alone_and_flagged() {
        let context = assembler().assemble(&retrieved(&[150, 10]), 100);
        assert_eq!(context.chunks.len(), 1);
        assert_eq!(context.chunks[0].rank, 1);
        assert!(context.truncated);
        assert_eq!(context.total_tokens, 150);
        assert_eq!(context.omitted, 1);
    }

    #[test]
    fn budget_is_respected_unless_truncated() {
        for budget in [0, 5, 25, 60, 95, 200] {
            let input = retrieved(&[20, 35, 5, 40]);
            let context = assembler().assemble(&input, budget);
            assert!(!context.is_empty());
            assert!(context.truncated || context.total_tokens <= budget);
            if context.truncated {
                assert_eq!(context.chunks.len(), 1);
            }
        }
    }

    #[test]
    fn render_and_sources_follow_rank_order() {
        let context = assembler().assemble(&retrieved(&[3, 3, 3]), 100);
        assert_eq!(context.sources(), vec!["file0.pdf", "file1.pdf"]);

        assert_eq!(
            context.source_counts(),
            vec![("file0.pdf".to_string(), 2), ("file1.pdf".to_string(), 1)]
        );

        let rendered = context.render();
        assert!(rendered.starts_with("--- From file0.pdf ---\nxxx\n"));
        assert_eq!(rendered.matches("--- From ").count(), 3);
    }

    #[test]
    fn section_headers_are_charged_against_the_budget() {
        let assembler = ContextAssembler::new(Arc::new(CharTokens));
        // each section is "\n--- From fileN.pdf ---\n" + 10 x + "\n" = 35 chars
        let context = assembler.assemble(&retrieved(&[10, 10, 10]), 80);

        assert_eq!(context.chunks.len(), 2);
        assert_eq!(context.total_tokens, 70);
        assert_eq!(context.omitted, 1);
        // render drops the separator in front of the first section
        assert_eq!(context.render().chars().count() + 1, context.total_tokens);
    }

    #[test]
    fn missing_tokenizer_file_is_a_config_error() {
        let err = TokenizerEstimator::from_file(Path::new("/no/such/tokenizer.json")).err();
        assert!(matches!(err, Some(RagError::Config(_))));
    }
}
