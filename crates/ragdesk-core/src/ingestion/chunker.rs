//! Deterministic text chunking with overlap

use unicode_segmentation::UnicodeSegmentation;

use super::extractor::PageText;

/// A passage produced by chunking, the unit of embedding
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    /// Position within the document
    pub index: u32,
    /// Page the passage came from, for paginated formats
    pub page_number: Option<u32>,
    /// Text content
    pub content: String,
}

/// Text chunker with fixed maximum size and overlap
///
/// Deterministic for a given input and configuration; re-ingestion of
/// identical text always yields identical passages.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum passage length in characters
    chunk_size: usize,
    /// Overlap carried from the tail of one passage into the next
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap: overlap.min(chunk_size / 2),
        }
    }

    /// Chunk plain text; empty or whitespace-only input yields zero passages
    pub fn chunk(&self, text: &str) -> Vec<Passage> {
        self.chunk_with_page(text, None, 0)
    }

    /// Chunk page-structured text, carrying page numbers into the passages
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<Passage> {
        let mut passages = Vec::new();
        for page in pages {
            let page_passages = self.chunk_with_page(
                &page.content,
                Some(page.page_number),
                passages.len() as u32,
            );
            passages.extend(page_passages);
        }
        passages
    }

    fn chunk_with_page(
        &self,
        text: &str,
        page_number: Option<u32>,
        start_index: u32,
    ) -> Vec<Passage> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut passages = Vec::new();
        let mut current = String::new();
        let mut index = start_index;

        for sentence in text.split_sentence_bounds() {
            // Sentences longer than the chunk size are split hard
            if sentence.len() > self.chunk_size {
                if !current.trim().is_empty() {
                    passages.push(Passage {
                        index,
                        page_number,
                        content: current.trim().to_string(),
                    });
                    index += 1;
                }
                current = self.overlap_tail(&current);
                for piece in split_at_char_boundaries(sentence, self.chunk_size) {
                    if !current.is_empty() && current.len() + piece.len() > self.chunk_size {
                        passages.push(Passage {
                            index,
                            page_number,
                            content: current.trim().to_string(),
                        });
                        index += 1;
                        current = self.overlap_tail(&current);
                    }
                    current.push_str(piece);
                }
                continue;
            }

            if !current.is_empty() && current.len() + sentence.len() > self.chunk_size {
                passages.push(Passage {
                    index,
                    page_number,
                    content: current.trim().to_string(),
                });
                index += 1;
                current = self.overlap_tail(&current);
            }
            current.push_str(sentence);
        }

        if !current.trim().is_empty() {
            passages.push(Passage {
                index,
                page_number,
                content: current.trim().to_string(),
            });
        }

        passages
    }

    /// Tail of the previous passage carried into the next one
    fn overlap_tail(&self, text: &str) -> String {
        if self.overlap == 0 || text.is_empty() {
            return String::new();
        }
        if text.len() <= self.overlap {
            return text.to_string();
        }
        let mut start = text.len() - self.overlap;
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
        let tail = &text[start..];
        // Prefer starting the overlap at a word boundary
        match tail.find(' ') {
            Some(pos) if pos + 1 < tail.len() => tail[pos + 1..].to_string(),
            _ => tail.to_string(),
        }
    }
}

/// Split a string into pieces of at most `max_len` bytes on char boundaries
fn split_at_char_boundaries(text: &str, max_len: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            break;
        }
        pieces.push(&text[start..end]);
        start = end;
    }
    pieces
}
