//! Repository indexing: tree-sitter chunk extraction, token-budgeted
//! description generation, and the cosine-similarity code index.
//!
//! The pipeline: walk the repository → extract one chunk per function/class
//! → pack chunk bodies into token-budgeted batches → summarize each batch
//! with one LLM call → embed all descriptions in bulk → persist records in
//! the vector store under the repository's namespace.

pub mod budget;
pub mod chunker;
pub mod codedb;
pub mod describe;
pub mod error;
pub mod overview;
pub mod repo;

pub use codedb::{CodeDb, CodeRecord, RecordKind, ScoredRecord};
pub use error::{IndexError, Result};
