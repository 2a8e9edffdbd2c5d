//! Grounded prompt assembly

use crate::retrieval::RetrievedChunk;

/// Builds the grounded prompt sent to the language model
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the context block from retrieved passages
    ///
    /// Each passage is tagged with a citation identifier the model can echo.
    pub fn build_context(chunks: &[RetrievedChunk]) -> String {
        let mut context = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            context.push_str(&format!(
                "[{}] {}\n\nContent:\n{}\n\n---\n\n",
                i + 1,
                Self::source_ref(chunk),
                chunk.content
            ));
        }
        context
    }

    fn source_ref(chunk: &RetrievedChunk) -> String {
        match chunk.page_number {
            Some(page) => format!("{}, Page {}", chunk.document_title, page),
            None => format!("{}, Chunk {}", chunk.document_title, chunk.chunk_index),
        }
    }

    /// Build the full grounded prompt
    pub fn build_grounded_prompt(question: &str, context: &str) -> String {
        format!(
            r#"Answer the question using ONLY the passages below.

RULES:
1. Use only information explicitly stated in the passages
2. If the passages do not contain the answer, say exactly: "I don't know the answer based on the available information."
3. Never use outside knowledge or make assumptions beyond the passages
4. Cite the source of each claim inline, e.g. [Source: filename, Page 2]

PASSAGES:
{context}

QUESTION: {question}

Answer using only the passages above:"#,
            context = context,
            question = question
        )
    }
}
