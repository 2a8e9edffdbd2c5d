//! Language model provider trait

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::types::Agent;

/// Result of a completion call, with provider-reported token counts
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text
    pub text: String,
    /// Input tokens as reported by the provider
    pub input_tokens: u32,
    /// Output tokens as reported by the provider
    pub output_tokens: u32,
}

/// Trait for language model completion and multimodal page description
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion from a system prompt, grounding context, and question
    async fn complete(&self, system_prompt: &str, context: &str, question: &str)
        -> Result<Completion>;

    /// Describe a page image with a multimodal model
    ///
    /// `image` is base64-encoded PNG data; `instruction` tells the model what
    /// to transcribe and describe.
    async fn describe_image(&self, image: &str, instruction: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model identifier used for completions
    fn model(&self) -> &str;
}

/// Maps an agent to the LLM client that answers for it
///
/// Agents choose their own model, so the client cannot be a single shared
/// instance; implementations typically cache clients per agent.
pub trait LlmResolver: Send + Sync {
    fn resolve(&self, agent: &Agent) -> Arc<dyn LlmProvider>;
}
