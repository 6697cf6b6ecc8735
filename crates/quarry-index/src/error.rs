//! Error types for quarry-index.

/// Errors that can occur during repository indexing.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider error (completion or embedding).
    #[error("LLM error: {0}")]
    Llm(#[from] quarry_llm::LlmError),

    /// Vector store error.
    #[error("store error: {0}")]
    Store(#[from] quarry_store::StoreError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Tree-sitter parsing error.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Repository acquisition error.
    #[error("repository error: {0}")]
    Repo(String),

    /// Generic catch-all error.
    #[error("{0}")]
    Other(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
