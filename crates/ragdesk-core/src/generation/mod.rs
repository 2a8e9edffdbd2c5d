//! Prompt assembly and confidence scoring for grounded answers

pub mod confidence;
pub mod prompt;

pub use prompt::PromptBuilder;
