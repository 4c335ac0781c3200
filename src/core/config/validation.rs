use super::settings::RagConfig;
use crate::core::errors::RagError;

pub fn validate_config(config: &RagConfig) -> Result<(), RagError> {
    validate_chunking(config.chunk_size, config.chunk_overlap)?;

    validate_min("embedding_dimension", config.embedding_dimension, 1)?;
    validate_min("embedding_batch_size", config.embedding_batch_size, 1)?;
    validate_min("top_k", config.top_k, 1)?;
    validate_min("context_token_budget", config.context_token_budget, 1)?;

    if config.chunk_size > config.max_input_chars {
        return Err(RagError::Config(format!(
            "chunk_size ({}) exceeds the embedder input limit max_input_chars ({})",
            config.chunk_size, config.max_input_chars
        )));
    }

    validate_non_empty("embedding_model", &config.embedding_model)?;
    validate_non_empty("completion_model", &config.completion_model)?;

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(RagError::Config(format!(
            "temperature must be between 0 and 2, got {}",
            config.temperature
        )));
    }

    if let Some(floor) = config.min_similarity {
        if !(-1.0..=1.0).contains(&floor) {
            return Err(RagError::Config(format!(
                "min_similarity must be between -1 and 1, got {}",
                floor
            )));
        }
    }

    Ok(())
}

/// Shared by `validate_config` and `Chunker::new`.
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<(), RagError> {
    if chunk_size == 0 {
        return Err(RagError::Config("chunk_size must be greater than 0".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::Config(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

fn validate_min(path: &str, value: usize, min: usize) -> Result<(), RagError> {
    if value < min {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': must be at least {}",
            path, min
        )));
    }
    Ok(())
}

fn validate_non_empty(path: &str, value: &str) -> Result<(), RagError> {
    if value.trim().is_empty() {
        return Err(RagError::Config(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}
