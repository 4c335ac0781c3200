//! Text-to-vector capability.
//!
//! Implementors provide a single raw model call (`embed_batch`). The provided
//! `embed` and `embed_one` methods add the guarantees callers rely on: input
//! order is preserved, output length equals input length, batches are
//! independent, and every vector has the advertised dimension.
//!
//! Over-long inputs are rejected, never truncated: a truncated chunk would be
//! stored with text its vector does not describe.

use async_trait::async_trait;

use crate::core::errors::RagError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in the index metadata.
    fn model_name(&self) -> &str;

    /// Length of every vector the model returns.
    fn dimension(&self) -> usize;

    /// Longest input, in characters, the model accepts.
    fn max_input_chars(&self) -> usize;

    fn batch_size(&self) -> usize {
        32
    }

    /// One model invocation over at most `batch_size` validated inputs.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embed `texts` in order. Empty input yields empty output.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        for (index, text) in texts.iter().enumerate() {
            let len = text.chars().count();
            if len > self.max_input_chars() {
                return Err(RagError::Embedding(format!(
                    "input {} is {} characters; model '{}' accepts at most {}",
                    index,
                    len,
                    self.model_name(),
                    self.max_input_chars()
                )));
            }
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size().max(1)) {
            let embedded = self.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "model returned {} vectors for {} inputs",
                    embedded.len(),
                    batch.len()
                )));
            }
            for vector in &embedded {
                check_vector(vector, self.dimension())?;
            }
            vectors.extend(embedded);
        }

        tracing::debug!("Embedded {} texts with {}", vectors.len(), self.model_name());
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RagError> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("model returned no vector".to_string()))
    }
}

fn check_vector(vector: &[f32], dimension: usize) -> Result<(), RagError> {
    if vector.len() != dimension {
        return Err(RagError::Embedding(format!(
            "model returned a {}-dimensional vector, expected {}",
            vector.len(),
            dimension
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(RagError::Embedding(
            "model returned a vector with non-finite values".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Deterministic letter-frequency embedder that records batch sizes.
    struct LetterEmbedder {
        batches: Mutex<Vec<usize>>,
        batch_size: usize,
    }

    impl LetterEmbedder {
        fn new(batch_size: usize) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                batch_size,
            }
        }
    }

    fn letter_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 4];
        for c in text.chars() {
            match c {
                'a' => v[0] += 1.0,
                'b' => v[1] += 1.0,
                'c' => v[2] += 1.0,
                _ => v[3] += 1.0,
            }
        }
        v
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dimension(&self) -> usize {
            4
        }
        fn max_input_chars(&self) -> usize {
            10
        }
        fn batch_size(&self) -> usize {
            self.batch_size
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.batches.lock().unwrap().push(texts.len());
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dimension(&self) -> usize {
            3
        }
        fn max_input_chars(&self) -> usize {
            100
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
        }
    }

    fn inputs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let embedder = LetterEmbedder::new(2);
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
        assert!(embedder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batching_matches_one_at_a_time() {
        let texts = inputs(&["aa", "b", "ccc", "abc", "z"]);
        let batched = LetterEmbedder::new(2).embed(&texts).await.unwrap();

        let single = LetterEmbedder::new(1);
        let mut one_by_one = Vec::new();
        for text in &texts {
            one_by_one.push(single.embed_one(text).await.unwrap());
        }

        assert_eq!(batched.len(), texts.len());
        assert_eq!(batched, one_by_one);
    }

    #[tokio::test]
    async fn inputs_are_split_into_batches() {
        let embedder = LetterEmbedder::new(2);
        embedder.embed(&inputs(&["a", "b", "c", "d", "e"])).await.unwrap();
        assert_eq!(*embedder.batches.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn over_long_input_is_rejected_before_any_model_call() {
        let embedder = LetterEmbedder::new(8);
        let err = embedder
            .embed(&inputs(&["ok", "this one is far too long"]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(msg) if msg.contains("input 1")));
        assert!(embedder.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_dimension_from_model_is_an_embedding_error() {
        let err = BrokenEmbedder.embed_one("hello").await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }
}
