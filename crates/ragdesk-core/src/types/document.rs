//! Document, chunk, and lifecycle status types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported file types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Paginated binary document; goes through the vision page describer
    Pdf,
    /// Plain text
    Txt,
    /// Markdown
    Markdown,
    /// HTML document
    Html,
    /// CSV file
    Csv,
    /// JSON file
    Json,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "csv" => Self::Csv,
            "json" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a declared MIME type
    pub fn from_mime(mime: &str) -> Self {
        match mime.split(';').next().unwrap_or("").trim() {
            "application/pdf" => Self::Pdf,
            "text/plain" => Self::Txt,
            "text/markdown" => Self::Markdown,
            "text/html" => Self::Html,
            "text/csv" => Self::Csv,
            "application/json" => Self::Json,
            _ => Self::Unknown,
        }
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
            Self::Csv => "CSV",
            Self::Json => "JSON",
            Self::Unknown => "Unknown",
        }
    }
}

/// Document lifecycle status
///
/// Legal transitions: Pending -> Processing -> {Completed, Failed},
/// Processing -> Pending (sweep recovery), and {Completed, Failed} -> Pending
/// (explicit reprocess). Everything else is rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Whether a transition from `self` to `to` is legal
    pub fn can_transition(&self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Completed, Pending)
                | (Failed, Pending)
        )
    }

    /// Database column representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database column representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded document owned by a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Knowledge base this document belongs to
    pub knowledge_base_id: Uuid,
    /// Original filename as uploaded
    pub filename: String,
    /// Declared file type
    pub file_type: FileType,
    /// File size in bytes
    pub file_size: u64,
    /// Object-store key for the raw bytes
    pub storage_key: Option<String>,
    /// Cached extracted text; ingestion skips extraction when present
    pub raw_text: Option<String>,
    /// SHA-256 of the stored bytes at last extraction; an unchanged hash
    /// lets reprocessing reuse the cached text
    pub content_hash: Option<String>,
    /// Lifecycle status
    pub status: DocumentStatus,
    /// Failure message; set only when status is Failed
    pub error_message: Option<String>,
    /// Number of chunks from the last successful ingestion
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new pending document
    pub fn new(
        tenant_id: Uuid,
        knowledge_base_id: Uuid,
        filename: String,
        file_type: FileType,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            knowledge_base_id,
            filename,
            file_type,
            file_size,
            storage_key: None,
            raw_text: None,
            content_hash: None,
            status: DocumentStatus::Pending,
            error_message: None,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A chunk of a document's extracted text, the unit of embedding and retrieval
///
/// Chunks are created only as a batch during a successful ingestion pass and
/// fully replaced on reprocessing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Parent document ID
    pub document_id: Uuid,
    /// Position within the document
    pub chunk_index: u32,
    /// Page number (1-indexed), when the source format is paginated
    pub page_number: Option<u32>,
    /// Text content
    pub content: String,
}

impl DocumentChunk {
    /// Deterministic vector-store key; re-ingestion overwrites rather than duplicates
    pub fn vector_key(&self) -> String {
        format!("{}:{}", self.document_id, self.chunk_index)
    }
}
