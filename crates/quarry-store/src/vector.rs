//! Vector store abstraction over one cosine-distance collection per
//! repository namespace.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    /// Cosine similarity to the query vector; higher is closer.
    pub score: f32,
    pub payload: HashMap<String, serde_json::Value>,
}

pub trait VectorStore: Send + Sync {
    /// Create the collection with cosine distance if it does not exist.
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// k-nearest-neighbor search, results sorted by similarity descending.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, StoreError>>;
}
