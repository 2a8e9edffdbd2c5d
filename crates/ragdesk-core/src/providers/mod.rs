//! Provider abstractions for embeddings, language models, vector storage,
//! and object storage
//!
//! Trait-based so backends can be swapped and tests can inject mocks.

pub mod client_cache;
pub mod embedding;
pub mod llm;
pub mod local;
pub mod object_store;
pub mod ollama;
pub mod vector_store;

pub use client_cache::{Clock, ProviderCache, SystemClock};
pub use embedding::EmbeddingProvider;
pub use llm::{Completion, LlmProvider, LlmResolver};
pub use local::InMemoryVectorStore;
pub use object_store::{LocalObjectStore, ObjectStoreProvider};
pub use ollama::{OllamaEmbedder, OllamaLlm, OllamaLlmPool};
pub use vector_store::{VectorMatch, VectorMetadata, VectorStoreProvider};
