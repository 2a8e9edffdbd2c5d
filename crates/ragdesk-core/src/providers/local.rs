//! In-memory vector store
//!
//! Cosine similarity over tenant-scoped namespaces. Used for tests and
//! single-node deployments; production deployments inject a remote store
//! behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::vector_store::{VectorMatch, VectorMetadata, VectorStoreProvider};

/// In-memory, tenant-namespaced vector store
#[derive(Default)]
pub struct InMemoryVectorStore {
    namespaces: DashMap<Uuid, HashMap<String, (Vec<f32>, VectorMetadata)>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStoreProvider for InMemoryVectorStore {
    async fn upsert(
        &self,
        namespace: Uuid,
        key: &str,
        vector: Vec<f32>,
        metadata: VectorMetadata,
    ) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::VectorStore("Empty vector".to_string()));
        }
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), (vector, metadata));
        Ok(())
    }

    async fn query(
        &self,
        namespace: Uuid,
        vector: &[f32],
        k: usize,
        knowledge_base_filter: Option<&[Uuid]>,
    ) -> Result<Vec<VectorMatch>> {
        let Some(entries) = self.namespaces.get(&namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<VectorMatch> = entries
            .iter()
            .filter(|(_, (_, meta))| match knowledge_base_filter {
                Some(kbs) => kbs.contains(&meta.knowledge_base_id),
                None => true,
            })
            .map(|(key, (stored, meta))| VectorMatch {
                key: key.clone(),
                score: cosine_similarity(vector, stored),
                metadata: meta.clone(),
            })
            .collect();

        // Deterministic ordering: score desc, then key asc as the tie-break
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn delete_by_document(&self, namespace: Uuid, document_id: Uuid) -> Result<usize> {
        let Some(mut entries) = self.namespaces.get_mut(&namespace) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|_, (_, meta)| meta.document_id != document_id);
        Ok(before - entries.len())
    }

    async fn len(&self, namespace: Uuid) -> Result<usize> {
        Ok(self.namespaces.get(&namespace).map(|e| e.len()).unwrap_or(0))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
