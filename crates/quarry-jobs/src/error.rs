use quarry_store::StoreError;

/// Recoverable job-layer errors, surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("spawn failed: {0}")]
    Spawn(String),
}

/// Fatal failure inside the worker loop. The worker marks the in-flight
/// query and its analyzer as ERROR, then the process exits. The outer
/// driver decides terminate-vs-log, never a silent catch-all.
#[derive(Debug, thiserror::Error)]
pub enum JobFatal {
    #[error("indexing failed: {0}")]
    Index(#[from] quarry_index::IndexError),

    #[error("agent failed: {0}")]
    Agent(#[from] quarry_agent::AgentError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Job(#[from] JobError),
}
