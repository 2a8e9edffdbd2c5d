//! Content extraction from raw uploaded files

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::FileType;

use super::vision::{join_pages, PageDescriber};

/// Text extracted from one page of a paginated document
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-indexed page number
    pub page_number: u32,
    /// Transcribed/described content; empty when the page failed
    pub content: String,
    /// Page contains images or photos
    pub has_images: bool,
    /// Page contains charts or graphs
    pub has_charts: bool,
    /// Page contains tabular content
    pub has_tables: bool,
}

impl PageText {
    /// Build a page result, deriving content flags by keyword inspection
    pub fn described(page_number: u32, content: String) -> Self {
        let lower = content.to_lowercase();
        let has_images = lower.contains("[image");
        let has_charts = lower.contains("[chart") || lower.contains("[graph");
        let has_tables = content.lines().filter(|l| l.matches('|').count() >= 2).count() >= 2;
        Self {
            page_number,
            content,
            has_images,
            has_charts,
            has_tables,
        }
    }

    /// A page whose rasterization or model call failed; recorded, not dropped
    pub fn empty(page_number: u32) -> Self {
        Self {
            page_number,
            content: String::new(),
            has_images: false,
            has_charts: false,
            has_tables: false,
        }
    }
}

/// Result of extracting a document's content
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Full extracted text, page markers included for paginated formats
    pub text: String,
    /// Per-page text for paginated formats; empty otherwise
    pub pages: Vec<PageText>,
}

impl ExtractedText {
    fn flat(text: String) -> Self {
        Self {
            text,
            pages: Vec::new(),
        }
    }
}

/// Converts raw uploaded bytes into plain text by declared type
///
/// Text-native formats decode directly. The paginated binary format (PDF)
/// goes through the vision page describer when one is configured, since its
/// layout and embedded graphics carry meaning; without a describer it falls
/// back to plain text extraction.
pub struct ContentExtractor {
    describer: Option<Arc<PageDescriber>>,
}

impl ContentExtractor {
    /// Extractor with a vision describer for graphics-heavy formats
    pub fn new(describer: Option<Arc<PageDescriber>>) -> Self {
        Self { describer }
    }

    /// Extractor without a vision path; PDFs use plain text extraction
    pub fn text_only() -> Self {
        Self { describer: None }
    }

    /// Extract plain text from raw bytes
    ///
    /// Unsupported declared types are rejected before any processing.
    /// Deterministic for text-native formats: identical bytes produce
    /// identical text.
    pub async fn extract(&self, data: &[u8], file_type: &FileType) -> Result<ExtractedText> {
        match file_type {
            FileType::Txt | FileType::Markdown => Ok(ExtractedText::flat(decode_utf8(data)?)),
            FileType::Json => extract_json(data),
            FileType::Csv => extract_csv(data),
            FileType::Html => extract_html(data),
            FileType::Pdf => self.extract_pdf(data).await,
            FileType::Unknown => Err(Error::Extraction(
                "Unsupported file type: unknown".to_string(),
            )),
        }
    }

    async fn extract_pdf(&self, data: &[u8]) -> Result<ExtractedText> {
        if let Some(describer) = &self.describer {
            let pages = describer.describe_document(data).await?;
            let described = pages.iter().filter(|p| !p.content.is_empty()).count();
            tracing::info!(
                "Vision extraction: {}/{} pages described",
                described,
                pages.len()
            );
            return Ok(ExtractedText {
                text: join_pages(&pages),
                pages,
            });
        }

        // No vision path configured; plain text extraction
        let text = pdf_extract::extract_text_from_mem(data)
            .map_err(|e| Error::Extraction(format!("PDF text extraction failed: {}", e)))?;
        Ok(ExtractedText::flat(text))
    }
}

/// SHA-256 content hash, hex-encoded; used to detect unchanged re-uploads
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn decode_utf8(data: &[u8]) -> Result<String> {
    match std::str::from_utf8(data) {
        Ok(s) => Ok(s.to_string()),
        // Tolerate stray bytes rather than rejecting the whole file
        Err(_) => Ok(String::from_utf8_lossy(data).to_string()),
    }
}

fn extract_json(data: &[u8]) -> Result<ExtractedText> {
    let text = decode_utf8(data)?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::Extraction(format!("Invalid JSON: {}", e)))?;
    let mut out = String::new();
    flatten_json(&value, &mut out);
    Ok(ExtractedText::flat(out))
}

/// Flatten JSON into searchable "key: value" lines
fn flatten_json(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                match inner {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        flatten_json(inner, out);
                    }
                    _ => {
                        out.push_str(key);
                        out.push_str(": ");
                        flatten_json(inner, out);
                    }
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_json(item, out);
            }
        }
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        other => {
            out.push_str(&other.to_string());
            out.push('\n');
        }
    }
}

fn extract_csv(data: &[u8]) -> Result<ExtractedText> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut out = String::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Extraction(format!("Invalid CSV: {}", e)))?;
        let row: Vec<&str> = record.iter().collect();
        out.push_str(&row.join(", "));
        out.push('\n');
    }
    Ok(ExtractedText::flat(out))
}

fn extract_html(data: &[u8]) -> Result<ExtractedText> {
    let html = decode_utf8(data)?;
    let document = scraper::Html::parse_document(&html);
    let selector = scraper::Selector::parse("body")
        .map_err(|e| Error::Extraction(format!("Selector error: {}", e)))?;

    let root_text: String = match document.select(&selector).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };

    // Collapse runs of whitespace left behind by markup
    let collapsed = root_text.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(ExtractedText::flat(collapsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text_passthrough() {
        let extractor = ContentExtractor::text_only();
        let result = extractor
            .extract(b"Office hours are 9am-5pm.", &FileType::Txt)
            .await
            .unwrap();
        assert_eq!(result.text, "Office hours are 9am-5pm.");
        assert!(result.pages.is_empty());
    }

    #[tokio::test]
    async fn test_determinism_for_identical_bytes() {
        let extractor = ContentExtractor::text_only();
        let data = b"# Heading\n\nSome *markdown* body.";
        let a = extractor.extract(data, &FileType::Markdown).await.unwrap();
        let b = extractor.extract(data, &FileType::Markdown).await.unwrap();
        assert_eq!(a.text, b.text);
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let extractor = ContentExtractor::text_only();
        let err = extractor.extract(b"bytes", &FileType::Unknown).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_csv_rows_joined() {
        let extractor = ContentExtractor::text_only();
        let result = extractor
            .extract(b"name,hours\nsupport,9-5\nsales,10-6\n", &FileType::Csv)
            .await
            .unwrap();
        assert!(result.text.contains("support, 9-5"));
        assert!(result.text.contains("sales, 10-6"));
    }

    #[tokio::test]
    async fn test_json_flattened() {
        let extractor = ContentExtractor::text_only();
        let result = extractor
            .extract(br#"{"faq": {"hours": "9am-5pm", "days": "Mon-Fri"}}"#, &FileType::Json)
            .await
            .unwrap();
        assert!(result.text.contains("hours: 9am-5pm"));
        assert!(result.text.contains("days: Mon-Fri"));
    }

    #[tokio::test]
    async fn test_json_invalid_rejected() {
        let extractor = ContentExtractor::text_only();
        let err = extractor.extract(b"{not json", &FileType::Json).await.unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[tokio::test]
    async fn test_html_markup_stripped() {
        let extractor = ContentExtractor::text_only();
        let html = b"<html><body><h1>Hours</h1><p>Open <b>9am</b> to 5pm.</p></body></html>";
        let result = extractor.extract(html, &FileType::Html).await.unwrap();
        assert!(result.text.contains("Hours"));
        assert!(result.text.contains("9am"));
        assert!(!result.text.contains("<p>"));
    }

    #[test]
    fn test_content_hash_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"abc").len(), 64);
    }

    #[test]
    fn test_page_flags_from_keywords() {
        let page = PageText::described(
            1,
            "Intro text. [IMAGE: office floor plan]\n[CHART: revenue by quarter]\n\
             | region | total |\n| north | 40 |"
                .to_string(),
        );
        assert!(page.has_images);
        assert!(page.has_charts);
        assert!(page.has_tables);

        let plain = PageText::described(2, "Just words.".to_string());
        assert!(!plain.has_images && !plain.has_charts && !plain.has_tables);
    }
}
