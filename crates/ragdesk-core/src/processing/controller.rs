//! Document ingestion pipeline
//!
//! Drives one document through extract, chunk, embed, and index. The
//! controller never lets an error escape: any failure inside the pipeline
//! lands the document in FAILED with a human-readable message, and a lost
//! claim on the PENDING->PROCESSING transition is a no-op rather than an
//! error, so two workers racing on the same document cannot double-index.

use std::sync::Arc;

use futures_util::future::join_all;
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{Error, Result};
use crate::ingestion::{content_hash, split_pages, ContentExtractor, Passage, TextChunker};
use crate::providers::{
    EmbeddingProvider, ObjectStoreProvider, VectorMetadata, VectorStoreProvider,
};
use crate::storage::Database;
use crate::types::{Document, DocumentChunk, DocumentStatus};

/// Result of one processing attempt
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub document_id: Uuid,
    /// False both for pipeline failures and for lost claims
    pub success: bool,
    pub chunk_count: u32,
    /// Failure message; None for success and for lost claims
    pub error: Option<String>,
}

/// Ingestion pipeline for a single document
#[derive(Clone)]
pub struct DocumentProcessor {
    db: Database,
    extractor: Arc<ContentExtractor>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStoreProvider>,
    object_store: Option<Arc<dyn ObjectStoreProvider>>,
    chunker: TextChunker,
    parallel_embeddings: usize,
}

impl DocumentProcessor {
    pub fn new(
        db: Database,
        extractor: Arc<ContentExtractor>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStoreProvider>,
        object_store: Option<Arc<dyn ObjectStoreProvider>>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            db,
            extractor,
            embedder,
            vector_store,
            object_store,
            chunker: TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap),
            parallel_embeddings: config.retrieval.parallel_embeddings.max(1),
        }
    }

    /// Process one pending document end to end
    ///
    /// Claims the document first; if another worker already holds it, the
    /// outcome is a benign no-op. Pipeline failures are recorded on the
    /// document and reported in the outcome, never returned as errors.
    pub async fn process_document(&self, document_id: Uuid) -> ProcessOutcome {
        let claimed = match self.claim(document_id) {
            Ok(claimed) => claimed,
            Err(e) => {
                return ProcessOutcome {
                    document_id,
                    success: false,
                    chunk_count: 0,
                    error: Some(e.to_string()),
                }
            }
        };
        let Some(document) = claimed else {
            tracing::info!(document_id = %document_id, "Document already claimed, skipping");
            return ProcessOutcome {
                document_id,
                success: false,
                chunk_count: 0,
                error: None,
            };
        };

        match self.run_pipeline(&document).await {
            Ok(chunk_count) => {
                tracing::info!(
                    document_id = %document_id,
                    filename = %document.filename,
                    chunk_count = chunk_count,
                    "Document processed"
                );
                ProcessOutcome {
                    document_id,
                    success: true,
                    chunk_count,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    document_id = %document_id,
                    filename = %document.filename,
                    error = %message,
                    "Document processing failed"
                );
                if let Err(db_err) = self.db.mark_failed(document_id, &message) {
                    tracing::warn!(
                        document_id = %document_id,
                        error = %db_err,
                        "Failed to record processing failure"
                    );
                }
                ProcessOutcome {
                    document_id,
                    success: false,
                    chunk_count: 0,
                    error: Some(message),
                }
            }
        }
    }

    /// Claim the PENDING -> PROCESSING transition; None means another worker won
    fn claim(&self, document_id: Uuid) -> Result<Option<Document>> {
        let document = self
            .db
            .get_document(document_id)?
            .ok_or(Error::DocumentNotFound(document_id))?;

        let won =
            self.db
                .try_transition(document_id, DocumentStatus::Pending, DocumentStatus::Processing)?;
        if !won {
            return Ok(None);
        }
        Ok(Some(document))
    }

    async fn run_pipeline(&self, document: &Document) -> Result<u32> {
        let passages = self.obtain_passages(document).await?;

        let chunks: Vec<DocumentChunk> = passages
            .into_iter()
            .map(|p| DocumentChunk {
                document_id: document.id,
                chunk_index: p.index,
                page_number: p.page_number,
                content: p.content,
            })
            .collect();

        let vectors = self.embed_all(&chunks).await?;

        // Old vectors go first so a re-ingestion with fewer chunks, or none
        // at all, leaves no strays
        self.vector_store
            .delete_by_document(document.tenant_id, document.id)
            .await?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            let metadata = VectorMetadata {
                document_id: document.id,
                knowledge_base_id: document.knowledge_base_id,
                document_title: document.filename.clone(),
                chunk_index: chunk.chunk_index,
                page_number: chunk.page_number,
                content: chunk.content.clone(),
            };
            self.vector_store
                .upsert(document.tenant_id, &chunk.vector_key(), vector, metadata)
                .await?;
        }

        self.db.complete_with_chunks(document.id, &chunks)?;
        Ok(chunks.len() as u32)
    }

    /// Passages for the document: cached text when the stored bytes are
    /// unchanged since the last extraction, fresh extraction otherwise
    async fn obtain_passages(&self, document: &Document) -> Result<Vec<Passage>> {
        if document.storage_key.is_some() {
            let data = self.fetch_bytes(document).await?;
            let hash = content_hash(&data);
            if document.content_hash.as_deref() == Some(hash.as_str()) {
                if let Some(text) = &document.raw_text {
                    tracing::info!(
                        document_id = %document.id,
                        "Content unchanged since last extraction, reusing cached text"
                    );
                    return Ok(self.chunk_cached(text));
                }
            }
            let extracted = self.extractor.extract(&data, &document.file_type).await?;
            self.db.set_extracted_text(document.id, &extracted.text, &hash)?;
            return Ok(if extracted.pages.is_empty() {
                self.chunker.chunk(&extracted.text)
            } else {
                self.chunker.chunk_pages(&extracted.pages)
            });
        }

        let text = document
            .raw_text
            .as_deref()
            .ok_or_else(|| Error::Extraction("Document has no stored content".to_string()))?;
        Ok(self.chunk_cached(text))
    }

    /// Chunk cached text, recovering page structure from page markers so a
    /// reprocessed paginated document keeps page numbers and marker-free
    /// chunk content
    fn chunk_cached(&self, text: &str) -> Vec<Passage> {
        match split_pages(text) {
            Some(pages) => self.chunker.chunk_pages(&pages),
            None => self.chunker.chunk(text),
        }
    }

    async fn fetch_bytes(&self, document: &Document) -> Result<Vec<u8>> {
        let key = document
            .storage_key
            .as_deref()
            .ok_or_else(|| Error::Extraction("Document has no stored content".to_string()))?;
        let store = self
            .object_store
            .as_ref()
            .ok_or_else(|| Error::ObjectStore("No object store configured".to_string()))?;
        store.get(key).await
    }

    /// Embed all chunks, a bounded batch at a time
    async fn embed_all(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.parallel_embeddings) {
            let futures = batch.iter().map(|chunk| self.embedder.embed(&chunk.content));
            for result in join_all(futures).await {
                vectors.push(result?);
            }
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{InMemoryVectorStore, LocalObjectStore};
    use crate::types::FileType;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // Deterministic per-text vector so identical content embeds identically
            let sum = text.bytes().map(|b| b as f32).sum::<f32>();
            Ok(vec![sum, text.len() as f32, 1.0])
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "fake"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::EmbeddingProvider("model unavailable".to_string()))
        }
        fn dimensions(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    fn processor_with(
        db: Database,
        store: Arc<InMemoryVectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> DocumentProcessor {
        DocumentProcessor::new(
            db,
            Arc::new(ContentExtractor::text_only()),
            embedder,
            store,
            None,
            &CoreConfig::default(),
        )
    }

    fn seed_text_document(db: &Database, text: &str) -> Document {
        // Documents reference their tenant, so the tenant row comes first
        let tenant_id = Uuid::new_v4();
        db.create_tenant(tenant_id, 1_000).unwrap();
        let mut doc = Document::new(
            tenant_id,
            Uuid::new_v4(),
            "notes.txt".to_string(),
            FileType::Txt,
            text.len() as u64,
        );
        doc.raw_text = Some(text.to_string());
        db.insert_document(&doc).unwrap();
        doc
    }

    #[tokio::test]
    async fn test_happy_path_completes_and_indexes() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store.clone(), Arc::new(FakeEmbedder));

        let doc = seed_text_document(&db, "Office hours are 9am-5pm Monday to Friday.");
        let outcome = processor.process_document(doc.id).await;

        assert!(outcome.success);
        assert_eq!(outcome.chunk_count, 1);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.chunk_count, 1);
        assert_eq!(store.len(doc.tenant_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_document_reports_error() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db, store, Arc::new(FakeEmbedder));

        let outcome = processor.process_document(Uuid::new_v4()).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_lost_claim_is_benign() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store, Arc::new(FakeEmbedder));

        let doc = seed_text_document(&db, "Some content.");
        // Simulate another worker holding the claim
        assert!(db
            .try_transition(doc.id, DocumentStatus::Pending, DocumentStatus::Processing)
            .unwrap());

        let outcome = processor.process_document(doc.id).await;
        assert!(!outcome.success);
        assert!(outcome.error.is_none());
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Processing);
    }

    #[tokio::test]
    async fn test_embedding_failure_marks_failed() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store.clone(), Arc::new(FailingEmbedder));

        let doc = seed_text_document(&db, "Some content that needs embedding.");
        let outcome = processor.process_document(doc.id).await;

        assert!(!outcome.success);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_message.is_some());
        assert_eq!(store.len(doc.tenant_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_document_completes_with_zero_chunks() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store.clone(), Arc::new(FakeEmbedder));

        let doc = seed_text_document(&db, "   \n\n  ");
        let outcome = processor.process_document(doc.id).await;

        assert!(outcome.success);
        assert_eq!(outcome.chunk_count, 0);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_zero_chunk_reingest_deletes_old_vectors() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store.clone(), Arc::new(FakeEmbedder));

        let doc = seed_text_document(&db, "A sentence worth indexing.");
        assert!(processor.process_document(doc.id).await.success);
        assert_eq!(store.len(doc.tenant_id).await.unwrap(), 1);

        // Content emptied out; the old vectors must not survive
        db.set_raw_text(doc.id, "   ").unwrap();
        db.reset_for_reprocess(doc.id).unwrap();
        let outcome = processor.process_document(doc.id).await;

        assert!(outcome.success);
        assert_eq!(outcome.chunk_count, 0);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.chunk_count, 0);
        assert_eq!(store.len(doc.tenant_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cached_paginated_text_keeps_page_structure() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store, Arc::new(FakeEmbedder));

        // Cached text as the vision path stores it, page markers included
        let cached = "--- Page 1 ---\n\nRefund policy details.\n\n--- Page 2 ---\n\nShipping rates table.";
        let doc = seed_text_document(&db, cached);

        let outcome = processor.process_document(doc.id).await;
        assert!(outcome.success);
        assert_eq!(outcome.chunk_count, 2);

        let chunks = db.get_chunks(doc.id).unwrap();
        assert_eq!(chunks[0].page_number, Some(1));
        assert_eq!(chunks[0].content, "Refund policy details.");
        assert_eq!(chunks[1].page_number, Some(2));
        assert!(!chunks.iter().any(|c| c.content.contains("--- Page")));
    }

    #[tokio::test]
    async fn test_unchanged_bytes_skip_extraction_on_reprocess() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(LocalObjectStore::new(dir.path()).unwrap());
        let processor = DocumentProcessor::new(
            db.clone(),
            Arc::new(ContentExtractor::text_only()),
            Arc::new(FakeEmbedder),
            store,
            Some(objects.clone()),
            &CoreConfig::default(),
        );

        let tenant_id = Uuid::new_v4();
        db.create_tenant(tenant_id, 1_000).unwrap();
        let mut doc = Document::new(
            tenant_id,
            Uuid::new_v4(),
            "policy.txt".to_string(),
            FileType::Txt,
            0,
        );
        doc.storage_key = Some("policy.txt".to_string());
        db.insert_document(&doc).unwrap();
        objects
            .put("policy.txt", b"Original policy text.", "text/plain")
            .await
            .unwrap();

        assert!(processor.process_document(doc.id).await.success);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert!(stored.content_hash.is_some());

        // Plant a sentinel in the cache; unchanged bytes must reuse it
        db.set_raw_text(doc.id, "Sentinel cached text.").unwrap();
        db.reset_for_reprocess(doc.id).unwrap();
        assert!(processor.process_document(doc.id).await.success);
        let chunks = db.get_chunks(doc.id).unwrap();
        assert_eq!(chunks[0].content, "Sentinel cached text.");

        // Changed bytes invalidate the cache and re-extract
        objects
            .put("policy.txt", b"Revised policy text.", "text/plain")
            .await
            .unwrap();
        db.reset_for_reprocess(doc.id).unwrap();
        assert!(processor.process_document(doc.id).await.success);
        let stored = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(stored.raw_text.as_deref(), Some("Revised policy text."));
        let chunks = db.get_chunks(doc.id).unwrap();
        assert_eq!(chunks[0].content, "Revised policy text.");
    }

    #[tokio::test]
    async fn test_reingest_replaces_old_vectors() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let processor = processor_with(db.clone(), store.clone(), Arc::new(FakeEmbedder));

        let long_text = "A sentence about billing policies. ".repeat(60);
        let doc = seed_text_document(&db, &long_text);
        let first = processor.process_document(doc.id).await;
        assert!(first.success);
        let first_count = store.len(doc.tenant_id).await.unwrap();
        assert!(first_count > 1);

        // Shrink the document and reprocess; stray vectors must not survive
        db.set_raw_text(doc.id, "One short sentence now.").unwrap();
        db.reset_for_reprocess(doc.id).unwrap();
        let second = processor.process_document(doc.id).await;
        assert!(second.success);
        assert_eq!(second.chunk_count, 1);
        assert_eq!(store.len(doc.tenant_id).await.unwrap(), 1);
    }
}
