//! Error types for the ingestion pipeline and query engine

use uuid::Uuid;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the ingestion pipeline, query engine, and ledger
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Content extraction failed (unsupported format, corrupt file, tool failure)
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Embedding provider failure (network, timeout, provider-side)
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// Language model provider failure (network, timeout, provider-side)
    #[error("model provider error: {0}")]
    ModelProvider(String),

    /// Vector store failure
    #[error("vector store error: {0}")]
    VectorStore(String),

    /// Object storage failure
    #[error("object store error: {0}")]
    ObjectStore(String),

    /// Relational store failure
    #[error("database error: {0}")]
    Database(String),

    /// Tenant balance cannot cover the charge
    #[error("insufficient balance: required {required} units, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    /// Document does not exist
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Agent does not exist
    #[error("agent not found: {0}")]
    AgentNotFound(Uuid),

    /// Agent exists but is disabled
    #[error("agent is inactive: {0}")]
    AgentInactive(Uuid),

    /// Illegal document status transition
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Anything that does not fit the taxonomy above
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Error::ModelProvider(e.to_string())
        } else {
            Error::Internal(e.to_string())
        }
    }
}
