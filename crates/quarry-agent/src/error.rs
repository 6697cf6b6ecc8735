#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] quarry_llm::LlmError),

    #[error("index error: {0}")]
    Index(#[from] quarry_index::IndexError),

    #[error("progress reporting failed: {0}")]
    Progress(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
