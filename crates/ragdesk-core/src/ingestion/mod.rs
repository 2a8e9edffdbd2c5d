//! Document ingestion: extraction, vision page description, chunking

mod chunker;
mod extractor;
pub mod vision;

pub use chunker::{Passage, TextChunker};
pub use extractor::{content_hash, ContentExtractor, ExtractedText, PageText};
pub use vision::{join_pages, split_pages, PageDescriber, PageOutcome, PageRasterizer, PopplerRasterizer};
