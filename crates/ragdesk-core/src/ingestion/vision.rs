//! Vision page describer for graphics-heavy paginated documents
//!
//! Each page is rasterized to PNG and handed to a multimodal model that
//! transcribes text verbatim and describes non-text content as tagged,
//! searchable descriptions. One bad page never fails the document: its
//! outcome is recorded as empty and the pipeline proceeds.

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use std::process::Command;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::providers::LlmProvider;

use super::extractor::PageText;

/// Instruction sent to the multimodal model for every page
const PAGE_INSTRUCTION: &str = "Transcribe ALL text on this page verbatim, preserving headings, \
lists, and reading order. Describe every image, diagram, or photo in-line as [IMAGE: description]. \
Describe every chart or graph as [CHART: description including axis labels and trends]. \
Render every table as pipe-delimited rows, one row per line. Output nothing else.";

/// Rasterizes a paginated document into per-page PNG images
pub trait PageRasterizer: Send + Sync {
    /// Rasterize up to `max_pages` pages, in page order
    fn rasterize(&self, data: &[u8], max_pages: usize, dpi: u32) -> Result<Vec<Vec<u8>>>;
}

/// Rasterizer backed by `pdftoppm` (poppler-utils)
pub struct PopplerRasterizer;

impl PageRasterizer for PopplerRasterizer {
    fn rasterize(&self, data: &[u8], max_pages: usize, dpi: u32) -> Result<Vec<Vec<u8>>> {
        let temp_dir = tempfile::tempdir()
            .map_err(|e| Error::Extraction(format!("Failed to create temp dir: {}", e)))?;

        let pdf_path = temp_dir.path().join("input.pdf");
        std::fs::write(&pdf_path, data)
            .map_err(|e| Error::Extraction(format!("Failed to write temp PDF: {}", e)))?;

        let output = Command::new("pdftoppm")
            .args([
                "-png",
                "-r",
                &dpi.to_string(),
                "-f",
                "1",
                "-l",
                &max_pages.to_string(),
                pdf_path.to_str().unwrap_or("input.pdf"),
                temp_dir.path().join("page").to_str().unwrap_or("page"),
            ])
            .output()
            .map_err(|e| Error::Extraction(format!("pdftoppm failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Extraction(format!("pdftoppm error: {}", stderr)));
        }

        let mut page_files: Vec<_> = std::fs::read_dir(temp_dir.path())
            .map_err(|e| Error::Extraction(format!("Failed to read temp dir: {}", e)))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        // pdftoppm zero-pads page numbers, so lexical order is page order
        page_files.sort();

        if page_files.is_empty() {
            return Err(Error::Extraction("pdftoppm produced no pages".to_string()));
        }

        page_files
            .iter()
            .map(|path| {
                std::fs::read(path)
                    .map_err(|e| Error::Extraction(format!("Failed to read page image: {}", e)))
            })
            .collect()
    }
}

/// Outcome of describing a single page
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Page was transcribed/described
    Described(String),
    /// Rasterization or the model call failed; the page is recorded empty
    Empty,
}

/// Describes rasterized pages with a multimodal model, bounded by a page cap
pub struct PageDescriber {
    llm: Arc<dyn LlmProvider>,
    rasterizer: Box<dyn PageRasterizer>,
    max_pages: usize,
    dpi: u32,
}

impl PageDescriber {
    /// Create a describer with the `pdftoppm` rasterizer
    pub fn new(llm: Arc<dyn LlmProvider>, max_pages: usize, dpi: u32) -> Self {
        Self::with_rasterizer(llm, Box::new(PopplerRasterizer), max_pages, dpi)
    }

    /// Create a describer with a custom rasterizer (tests inject one)
    pub fn with_rasterizer(
        llm: Arc<dyn LlmProvider>,
        rasterizer: Box<dyn PageRasterizer>,
        max_pages: usize,
        dpi: u32,
    ) -> Self {
        Self {
            llm,
            rasterizer,
            max_pages,
            dpi,
        }
    }

    /// Describe a whole document, page by page
    ///
    /// Returns one [`PageText`] per rasterized page, in page order. Pages
    /// whose model call fails come back empty rather than aborting the
    /// document.
    pub async fn describe_document(&self, data: &[u8]) -> Result<Vec<PageText>> {
        // Rasterization shells out; keep it off the async executor
        let images = tokio::task::block_in_place(|| {
            self.rasterizer.rasterize(data, self.max_pages, self.dpi)
        })?;

        tracing::info!("Describing {} rasterized pages (cap {})", images.len(), self.max_pages);

        let mut pages = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let page_number = (i + 1) as u32;
            match self.describe_page(image).await {
                PageOutcome::Described(text) => {
                    pages.push(PageText::described(page_number, text));
                }
                PageOutcome::Empty => {
                    tracing::warn!("Page {} produced no content, continuing", page_number);
                    pages.push(PageText::empty(page_number));
                }
            }
        }
        Ok(pages)
    }

    /// Describe a single page image
    async fn describe_page(&self, image: &[u8]) -> PageOutcome {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        match self.llm.describe_image(&encoded, PAGE_INSTRUCTION).await {
            Ok(text) if !text.trim().is_empty() => PageOutcome::Described(text),
            Ok(_) => PageOutcome::Empty,
            Err(e) => {
                tracing::warn!("Vision model call failed: {}", e);
                PageOutcome::Empty
            }
        }
    }
}

/// Join page texts in page order with page-boundary markers
pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&format!("--- Page {} ---\n\n", page.page_number));
        text.push_str(&page.content);
    }
    text
}

/// Inverse of [`join_pages`]: recover per-page structure from joined text
///
/// Returns None when the text carries no page markers, so non-paginated
/// cached text chunks as flat text. Markers themselves never end up in
/// page content.
pub fn split_pages(text: &str) -> Option<Vec<PageText>> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let re = MARKER
        .get_or_init(|| Regex::new(r"(?m)^--- Page (\d+) ---$").expect("page marker regex is valid"));

    let markers: Vec<(usize, usize, u32)> = re
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let number = captures.get(1)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), number))
        })
        .collect();
    if markers.is_empty() {
        return None;
    }

    let mut pages = Vec::with_capacity(markers.len());
    for (i, (_, end, number)) in markers.iter().enumerate() {
        let content_end = markers.get(i + 1).map(|next| next.0).unwrap_or(text.len());
        let content = text[*end..content_end].trim();
        pages.push(PageText::described(*number, content.to_string()));
    }
    Some(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Completion;
    use parking_lot::Mutex;

    struct FakeRasterizer {
        pages: usize,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(&self, _data: &[u8], max_pages: usize, _dpi: u32) -> Result<Vec<Vec<u8>>> {
            Ok((0..self.pages.min(max_pages)).map(|i| vec![i as u8]).collect())
        }
    }

    struct FakeVision {
        /// Page index (0-based) -> error
        failing: Vec<usize>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmProvider for FakeVision {
        async fn complete(&self, _s: &str, _c: &str, _q: &str) -> Result<Completion> {
            unimplemented!("not used in vision tests")
        }

        async fn describe_image(&self, _image: &str, _instruction: &str) -> Result<String> {
            let mut calls = self.calls.lock();
            let index = *calls;
            *calls += 1;
            if self.failing.contains(&index) {
                return Err(Error::ModelProvider("vision timeout".to_string()));
            }
            Ok(format!(
                "Page text {}. [IMAGE: a product photo]\n| col a | col b |\n| 1 | 2 |",
                index + 1
            ))
        }

        fn name(&self) -> &str {
            "fake-vision"
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    fn describer(pages: usize, failing: Vec<usize>, max_pages: usize) -> PageDescriber {
        PageDescriber::with_rasterizer(
            Arc::new(FakeVision {
                failing,
                calls: Mutex::new(0),
            }),
            Box::new(FakeRasterizer { pages }),
            max_pages,
            150,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pages_described_in_order() {
        let pages = describer(3, vec![], 20).describe_document(b"pdf").await.unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_number, 1);
        assert!(pages[0].content.contains("Page text 1"));
        assert!(pages[2].content.contains("Page text 3"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_page_cap_bounds_work() {
        let pages = describer(50, vec![], 20).describe_document(b"pdf").await.unwrap();
        assert_eq!(pages.len(), 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_page_is_empty_not_fatal() {
        let pages = describer(3, vec![1], 20).describe_document(b"pdf").await.unwrap();
        assert_eq!(pages.len(), 3);
        assert!(!pages[0].content.is_empty());
        assert!(pages[1].content.is_empty());
        assert!(!pages[2].content.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_content_flags_derived() {
        let pages = describer(1, vec![], 20).describe_document(b"pdf").await.unwrap();
        assert!(pages[0].has_images);
        assert!(pages[0].has_tables);
        assert!(!pages[0].has_charts);
    }

    #[test]
    fn test_join_pages_markers() {
        let pages = vec![
            PageText::described(1, "First.".to_string()),
            PageText::described(2, "Second.".to_string()),
        ];
        let joined = join_pages(&pages);
        assert!(joined.contains("--- Page 1 ---"));
        assert!(joined.contains("--- Page 2 ---"));
        assert!(joined.find("First.").unwrap() < joined.find("Second.").unwrap());
    }

    #[test]
    fn test_split_pages_inverts_join() {
        let original = vec![
            PageText::described(1, "First page text.".to_string()),
            PageText::described(3, "Third page text.".to_string()),
        ];
        let pages = split_pages(&join_pages(&original)).unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].content, "First page text.");
        assert_eq!(pages[1].page_number, 3);
        assert_eq!(pages[1].content, "Third page text.");
        assert!(!pages.iter().any(|p| p.content.contains("--- Page")));
    }

    #[test]
    fn test_split_pages_none_for_flat_text() {
        assert!(split_pages("Just some flat text with no markers.").is_none());
        assert!(split_pages("").is_none());
    }
}
