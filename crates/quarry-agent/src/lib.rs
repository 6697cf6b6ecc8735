//! Retrieval-augmented answering over an indexed repository.
//!
//! One [`agent::RetrievalAgent`] run turns a user question into search
//! sentences, retrieves and deduplicates code records, packs them into
//! token-budgeted answer prompts, and fans the completions out concurrently.

pub mod agent;
pub mod error;
pub mod prompt;

pub use agent::{AgentConfig, AgentStage, AnswerReport, NoopProgress, Progress, RetrievalAgent};
pub use error::{AgentError, Result};
