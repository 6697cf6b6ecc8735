use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::vector::{BoxFuture, ScoredPoint, VectorPoint, VectorStore};

struct StoredPoint {
    id: String,
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
}

/// Points kept in insertion order so equal-score hits rank stably.
struct InMemoryCollection {
    points: Vec<StoredPoint>,
}

pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, InMemoryCollection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn poisoned(e: impl std::fmt::Display) -> StoreError {
    StoreError::Other(e.to_string())
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: u64,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            cols.entry(collection)
                .or_insert_with(|| InMemoryCollection { points: Vec::new() });
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self.collections.write().map_err(poisoned)?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Upsert(format!("collection {collection} not found")))?;
            for p in points {
                match col.points.iter_mut().find(|sp| sp.id == p.id) {
                    Some(existing) => {
                        existing.vector = p.vector;
                        existing.payload = p.payload;
                    }
                    None => col.points.push(StoredPoint {
                        id: p.id,
                        vector: p.vector,
                        payload: p.payload,
                    }),
                }
            }
            Ok(())
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self.collections.read().map_err(poisoned)?;
            let col = cols
                .get(&collection)
                .ok_or_else(|| StoreError::Search(format!("collection {collection} not found")))?;

            let mut scored: Vec<ScoredPoint> = col
                .points
                .iter()
                .map(|sp| ScoredPoint {
                    id: sp.id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            // Stable sort keeps insertion order among equal scores.
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            #[expect(clippy::cast_possible_truncation)]
            scored.truncate(limit as usize);
            Ok(scored)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            payload: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn ensure_collection_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        store.ensure_collection("c", 3).await.unwrap();
        assert!(store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 3).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0, 0.0]),
                    point("near", vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", vec![1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    point("first", vec![1.0, 0.0]),
                    point("second", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", vec![1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("c", vec![point("a", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = store.search("c", vec![0.0, 1.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn delete_collection_removes_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.delete_collection("c").await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn search_missing_collection_errors() {
        let store = InMemoryVectorStore::new();
        assert!(store.search("nope", vec![1.0], 1).await.is_err());
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!((cosine_similarity(&[0.0, 0.0], &[1.0, 0.0])).abs() < f32::EPSILON);
    }
}
