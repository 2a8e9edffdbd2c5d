//! Core types for documents, agents, billing, and answers

pub mod agent;
pub mod billing;
pub mod document;
pub mod response;

pub use agent::{Agent, Conversation};
pub use billing::{DebitReceipt, TransactionKind, UsageTransaction};
pub use document::{Document, DocumentChunk, DocumentStatus, FileType};
pub use response::{AnswerResponse, Citation};
