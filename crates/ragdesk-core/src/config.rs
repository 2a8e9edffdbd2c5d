//! Configuration for the ingestion pipeline and query engine

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Vision page-description configuration
    #[serde(default)]
    pub vision: VisionConfig,
    /// Processing and recovery-sweep configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Usage metering configuration
    #[serde(default)]
    pub billing: BillingConfig,
    /// LLM/embedding backend configuration
    #[serde(default)]
    pub llm: LlmConfig,
}

impl CoreConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Internal(format!("Failed to read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of chunks to retrieve per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Number of parallel embedding calls during ingestion
    #[serde(default = "default_parallel_embeddings")]
    pub parallel_embeddings: usize,
}

fn default_top_k() -> usize {
    5
}
fn default_parallel_embeddings() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            parallel_embeddings: default_parallel_embeddings(),
        }
    }
}

/// Vision page-description configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Maximum number of pages rasterized and described per document
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Rasterization resolution in DPI
    #[serde(default = "default_raster_dpi")]
    pub raster_dpi: u32,
}

fn default_max_pages() -> usize {
    20
}
fn default_raster_dpi() -> u32 {
    150
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            raster_dpi: default_raster_dpi(),
        }
    }
}

/// Processing and recovery-sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// A PROCESSING document untouched for longer than this is considered stuck
    #[serde(default = "default_stuck_timeout_secs")]
    pub stuck_timeout_secs: u64,
    /// Only documents created within this window are considered by the sweep
    #[serde(default = "default_recency_window_secs")]
    pub recency_window_secs: u64,
    /// Documents older than this are never auto-retried
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Maximum documents processed per sweep invocation
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

fn default_stuck_timeout_secs() -> u64 {
    300
}
fn default_recency_window_secs() -> u64 {
    86_400
}
fn default_max_age_secs() -> u64 {
    7 * 86_400
}
fn default_sweep_batch_size() -> usize {
    3
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            stuck_timeout_secs: default_stuck_timeout_secs(),
            recency_window_secs: default_recency_window_secs(),
            max_age_secs: default_max_age_secs(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

/// Usage metering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Default units charged per 1k input tokens for unknown models
    #[serde(default = "default_input_rate")]
    pub default_input_rate: i64,
    /// Default units charged per 1k output tokens for unknown models
    #[serde(default = "default_output_rate")]
    pub default_output_rate: i64,
}

fn default_input_rate() -> i64 {
    10
}
fn default_output_rate() -> i64 {
    30
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_input_rate: default_input_rate(),
            default_output_rate: default_output_rate(),
        }
    }
}

/// LLM/embedding backend configuration (Ollama-compatible endpoint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the model server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Embedding model name; must match between ingestion and query
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    /// Generation model name
    #[serde(default = "default_generate_model")]
    pub generate_model: String,
    /// Multimodal model used for page description
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_generate_model() -> String {
    "llama3.1".to_string()
}
fn default_vision_model() -> String {
    "llava".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embed_model: default_embed_model(),
            generate_model: default_generate_model(),
            vision_model: default_vision_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
