use async_trait::async_trait;

use super::types::Completion;
use crate::core::errors::RagError;

/// Language-model completion used to answer a question from retrieved context.
///
/// Failures are reported as `RagError::Completion` and never touch the index.
#[async_trait]
pub trait Completer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt_context: &str, question: &str) -> Result<Completion, RagError>;
}
