#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("collection error: {0}")]
    Collection(String),

    #[error("upsert error: {0}")]
    Upsert(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("delete error: {0}")]
    Delete(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
