//! Ollama-backed providers for embeddings, completion, and page description

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::types::Agent;

use super::client_cache::ProviderCache;
use super::embedding::EmbeddingProvider;
use super::llm::{Completion, LlmProvider, LlmResolver};

/// Ollama embedding provider (nomic-embed-text or similar)
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create a new embedder
    pub fn new(config: &LlmConfig, dimensions: usize) -> Self {
        Self {
            client: http_client(config.request_timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.embed_model.clone(),
            dimensions,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| Error::EmbeddingProvider(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::EmbeddingProvider(format!(
                "Server returned {}",
                response.status()
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::EmbeddingProvider(format!("Invalid response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(Error::EmbeddingProvider("Empty embedding".to_string()));
        }
        Ok(body.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama-backed LLM provider for grounded answering and page description
pub struct OllamaLlm {
    client: reqwest::Client,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OllamaLlm {
    /// Create a new LLM provider with the configured default model
    pub fn new(config: &LlmConfig) -> Self {
        Self::for_model(config, &config.generate_model)
    }

    /// Create an LLM provider answering with a specific model
    pub fn for_model(config: &LlmConfig, model: &str) -> Self {
        Self {
            client: http_client(config.request_timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision_model: config.vision_model.clone(),
        }
    }
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(serde::Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<&'a str>,
    stream: bool,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<Completion> {
        let user_content = if context.is_empty() {
            question.to_string()
        } else {
            format!("{}\n\n{}", context, question)
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: system_prompt.to_string(),
                    },
                    ChatMessage {
                        role: "user",
                        content: user_content,
                    },
                ],
                stream: false,
            })
            .send()
            .await
            .map_err(|e| Error::ModelProvider(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ModelProvider(format!(
                "Server returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelProvider(format!("Invalid response: {}", e)))?;

        Ok(Completion {
            text: body.message.content,
            input_tokens: body.prompt_eval_count,
            output_tokens: body.eval_count,
        })
    }

    async fn describe_image(&self, image: &str, instruction: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&GenerateRequest {
                model: &self.vision_model,
                prompt: instruction,
                images: vec![image],
                stream: false,
            })
            .send()
            .await
            .map_err(|e| Error::ModelProvider(format!("Vision request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::ModelProvider(format!(
                "Vision server returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::ModelProvider(format!("Invalid vision response: {}", e)))?;
        Ok(body.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Per-agent pool of Ollama clients
///
/// Each agent picks its own generation model, so clients are cached per
/// agent and rebuilt after the TTL or when the agent's model changes.
pub struct OllamaLlmPool {
    cache: ProviderCache<OllamaLlm>,
    config: LlmConfig,
}

impl OllamaLlmPool {
    pub fn new(config: LlmConfig, ttl: Duration) -> Self {
        Self {
            cache: ProviderCache::new(ttl),
            config,
        }
    }

    /// Drop the cached client for an agent; call after agent model updates
    pub fn invalidate(&self, agent_id: Uuid) {
        self.cache.invalidate(agent_id);
    }
}

impl LlmResolver for OllamaLlmPool {
    fn resolve(&self, agent: &Agent) -> Arc<dyn LlmProvider> {
        self.cache
            .get_or_insert_with(agent.id, || OllamaLlm::for_model(&self.config, &agent.model))
    }
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_default()
}
