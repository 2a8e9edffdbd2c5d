//! Citation and answer types returned by the query engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retrieval::RetrievedChunk;

/// Citation pointing at the passage an answer was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Source document ID
    pub document_id: Uuid,
    /// Source document title (filename)
    pub document_title: String,
    /// Chunk index within the document
    pub chunk_index: u32,
    /// Page number, when the source format is paginated
    pub page_number: Option<u32>,
    /// Exact snippet from the source
    pub snippet: String,
    /// Retrieval similarity score (0.0-1.0)
    pub similarity: f32,
}

impl Citation {
    /// Build a citation from a retrieved chunk
    pub fn from_retrieved(chunk: &RetrievedChunk) -> Self {
        Self {
            document_id: chunk.document_id,
            document_title: chunk.document_title.clone(),
            chunk_index: chunk.chunk_index,
            page_number: chunk.page_number,
            snippet: chunk.content.clone(),
            similarity: chunk.similarity,
        }
    }

    /// Format citation for inline display
    pub fn format_inline(&self) -> String {
        match self.page_number {
            Some(page) => format!("[Source: {}, Page {}]", self.document_title, page),
            None => format!("[Source: {}, Chunk {}]", self.document_title, self.chunk_index),
        }
    }
}

/// Answer produced by the query engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// Generated answer text
    pub content: String,
    /// Grounding confidence (0.0-1.0)
    pub confidence: f32,
    /// Citations for the passages used
    pub citations: Vec<Citation>,
    /// Whether the conversation should be handed off to a human
    pub should_handoff: bool,
    /// Model that produced the answer; empty when no model was called
    pub model: String,
    /// Total tokens consumed (input + output)
    pub tokens_used: u32,
    /// Wall-clock latency of the model call in milliseconds
    pub latency_ms: u64,
    /// Set when the tenant balance could not cover the charge; the answer is
    /// still returned since the model call already happened
    #[serde(default)]
    pub balance_warning: bool,
}

impl AnswerResponse {
    /// Canned response when retrieval found no grounding at all
    pub fn no_grounding(model: &str) -> Self {
        Self {
            content: "I could not find any information about this in the available \
                      documents. Let me connect you with a member of our team."
                .to_string(),
            confidence: 0.0,
            citations: Vec::new(),
            should_handoff: true,
            model: model.to_string(),
            tokens_used: 0,
            latency_ms: 0,
            balance_warning: false,
        }
    }
}
