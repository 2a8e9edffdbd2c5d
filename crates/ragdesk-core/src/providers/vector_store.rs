//! Vector store provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Metadata stored alongside each vector, enough to rebuild a citation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub document_id: Uuid,
    pub knowledge_base_id: Uuid,
    pub document_title: String,
    pub chunk_index: u32,
    pub page_number: Option<u32>,
    pub content: String,
}

/// A match returned by a similarity query
#[derive(Debug, Clone)]
pub struct VectorMatch {
    /// Vector key (`"{document_id}:{chunk_index}"`)
    pub key: String,
    /// Similarity score (0.0-1.0, higher is more similar)
    pub score: f32,
    pub metadata: VectorMetadata,
}

/// Trait for tenant-namespaced vector storage and similarity search
///
/// Namespace is always the tenant identifier; nothing ever crosses namespaces.
/// Keys are deterministic per chunk so re-ingestion overwrites rather than
/// duplicates.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or overwrite a vector under a deterministic key
    async fn upsert(
        &self,
        namespace: Uuid,
        key: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<()>;

    /// Top-k similarity search, optionally restricted to a set of knowledge bases
    async fn query(
        &self,
        namespace: Uuid,
        vector: &[f32],
        k: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorMatch>>;

    /// Delete all vectors belonging to a document
    async fn delete_by_document(&self, namespace: Uuid, document_id: Uuid) -> Result<usize>;

    /// Number of vectors in a namespace
    async fn len(&self, namespace: Uuid) -> Result<usize>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
