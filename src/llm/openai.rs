//! Clients for OpenAI-compatible HTTP servers (OpenAI, LM Studio, llama.cpp server).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::prompt::build_prompt;
use super::provider::Completer;
use super::types::{ChatMessage, ChatRequest, Completion, TokenUsage};
use crate::core::config::RagConfig;
use crate::core::errors::RagError;
use crate::rag::embedder::Embedder;

const API_KEY_ENV: &str = "OPENAI_API_KEY";

fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}

fn authorized(request: RequestBuilder, api_key: Option<&str>) -> RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Vectors in input order; servers may return `data` shuffled but tagged with `index`.
fn parse_embeddings(body: &str) -> Result<Vec<Vec<f32>>, RagError> {
    let response: EmbeddingResponse = serde_json::from_str(body).map_err(RagError::embedding)?;
    let mut items: Vec<(usize, Vec<f32>)> = response
        .data
        .into_iter()
        .enumerate()
        .map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
        .collect();
    items.sort_by_key(|(index, _)| *index);
    Ok(items.into_iter().map(|(_, embedding)| embedding).collect())
}

fn parse_completion(body: &str) -> Result<Completion, RagError> {
    let response: CompletionResponse = serde_json::from_str(body).map_err(RagError::completion)?;
    let text = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .ok_or_else(|| RagError::completion("response contained no choices"))?;
    Ok(Completion {
        text,
        usage: response.usage,
    })
}

#[derive(Clone)]
pub struct OpenAiCompatibleEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    max_input_chars: usize,
    batch_size: usize,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            max_input_chars: usize::MAX,
            batch_size: 32,
            api_key: api_key_from_env(),
            client: Client::new(),
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        let mut embedder = Self::new(
            &config.embedding_base_url,
            config.embedding_model.clone(),
            config.embedding_dimension,
        );
        embedder.max_input_chars = config.max_input_chars;
        embedder.batch_size = config.embedding_batch_size;
        embedder
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let res = authorized(self.client.post(&url), self.api_key.as_deref())
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("embedding server unreachable: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("{} from {}: {}", status, url, text)));
        }

        let text = res.text().await.map_err(RagError::embedding)?;
        parse_embeddings(&text)
    }
}

#[derive(Clone)]
pub struct OpenAiCompatibleCompleter {
    base_url: String,
    model: String,
    system_prompt: String,
    temperature: f64,
    max_tokens: u32,
    api_key: Option<String>,
    client: Client,
}

impl OpenAiCompatibleCompleter {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            base_url: config.completion_base_url.trim_end_matches('/').to_string(),
            model: config.completion_model.clone(),
            system_prompt: config.system_prompt().to_string(),
            temperature: config.temperature,
            max_tokens: config.max_completion_tokens,
            api_key: api_key_from_env(),
            client: Client::new(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl Completer for OpenAiCompatibleCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt_context: &str, question: &str) -> Result<Completion, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let prompt = build_prompt(&self.system_prompt, prompt_context, question);
        let request = ChatRequest::new(self.model.clone(), vec![ChatMessage::user(prompt)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let res = authorized(self.client.post(&url), self.api_key.as_deref())
            .json(&request)
            .send()
            .await
            .map_err(RagError::completion)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Completion(format!("{} from {}: {}", status, url, text)));
        }

        let text = res.text().await.map_err(RagError::completion)?;
        let completion = parse_completion(&text)?;
        if let Some(usage) = completion.usage {
            tracing::debug!(
                "{} used {} prompt + {} completion tokens",
                self.model,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(completion)
    }
}
