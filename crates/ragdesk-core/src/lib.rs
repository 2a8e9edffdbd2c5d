//! ragdesk-core: document-grounded support agents with usage metering
//!
//! This crate is the core of a multi-tenant support bot. It ingests tenant
//! documents through an async state machine (extract, chunk, embed, index),
//! answers questions grounded in the indexed content with citations and a
//! confidence score, hands low-confidence conversations off to humans, and
//! meters every model call against a prepaid balance.

pub mod billing;
pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod storage;
pub mod types;

pub use billing::UsageLedger;
pub use config::CoreConfig;
pub use engine::QueryEngine;
pub use error::{Error, Result};
pub use processing::{DocumentProcessor, RecoverySweep};
pub use storage::Database;
pub use types::{
    agent::{Agent, Conversation},
    document::{Document, DocumentChunk, DocumentStatus, FileType},
    response::{AnswerResponse, Citation},
};
