//! Scoped vector retrieval

use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::providers::VectorStoreProvider;

/// A chunk retrieved for grounding, with its similarity score
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub document_id: Uuid,
    pub document_title: String,
    pub chunk_index: u32,
    pub page_number: Option<u32>,
    pub content: String,
    /// Similarity score (0.0-1.0)
    pub similarity: f32,
}

/// Retrieves top-k chunks scoped to a tenant namespace and a set of
/// permitted knowledge bases
pub struct Retriever {
    vector_store: Arc<dyn VectorStoreProvider>,
}

impl Retriever {
    pub fn new(vector_store: Arc<dyn VectorStoreProvider>) -> Self {
        Self { vector_store }
    }

    /// Retrieve the top-k most similar chunks for an embedded question
    ///
    /// A vector store failure degrades to zero results rather than failing
    /// the query; an empty-context answer with forced handoff is safer than
    /// no answer.
    pub async fn retrieve(
        &self,
        tenant_id: Uuid,
        knowledge_base_ids: &[Uuid],
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let matches = match self
            .vector_store
            .query(tenant_id, query_vector, top_k, Some(knowledge_base_ids))
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!("Vector store query failed, degrading to no grounding: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut chunks: Vec<RetrievedChunk> = matches
            .into_iter()
            .map(|m| RetrievedChunk {
                document_id: m.metadata.document_id,
                document_title: m.metadata.document_title,
                chunk_index: m.metadata.chunk_index,
                page_number: m.metadata.page_number,
                content: m.metadata.content,
                similarity: m.score,
            })
            .collect();

        // Deterministic ordering even when the backend returns ties
        chunks.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::{VectorMatch, VectorMetadata};
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl VectorStoreProvider for FailingStore {
        async fn upsert(
            &self,
            _namespace: Uuid,
            _key: &str,
            _vector: Vec<f32>,
            _metadata: VectorMetadata,
        ) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _namespace: Uuid,
            _vector: &[f32],
            _k: usize,
            _filter: Option<&[Uuid]>,
        ) -> Result<Vec<VectorMatch>> {
            Err(Error::VectorStore("connection refused".to_string()))
        }

        async fn delete_by_document(&self, _namespace: Uuid, _document_id: Uuid) -> Result<usize> {
            Ok(0)
        }

        async fn len(&self, _namespace: Uuid) -> Result<usize> {
            Ok(0)
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_empty() {
        let retriever = Retriever::new(Arc::new(FailingStore));
        let chunks = retriever
            .retrieve(Uuid::new_v4(), &[Uuid::new_v4()], &[1.0, 0.0], 5)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }
}
