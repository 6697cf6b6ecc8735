//! Qdrant-backed vector store.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};

use crate::error::StoreError;
use crate::vector::{BoxFuture, ScoredPoint, VectorPoint, VectorStore};

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// # Errors
    ///
    /// Returns an error if the client fails to connect.
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

/// Qdrant point ids are u64 or UUID; numeric record ids map to the former.
fn to_point_id(id: &str) -> PointId {
    match id.parse::<u64>() {
        Ok(n) => PointId::from(n),
        Err(_) => PointId::from(id.to_owned()),
    }
}

fn from_point_id(id: Option<&PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => String::new(),
    }
}

fn to_qdrant_payload(
    payload: HashMap<String, serde_json::Value>,
) -> Result<HashMap<String, qdrant_client::qdrant::Value>, StoreError> {
    serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
        .map_err(StoreError::Serialization)
}

fn from_qdrant_payload(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> HashMap<String, serde_json::Value> {
    payload
        .iter()
        .map(|(k, v)| {
            (
                k.clone(),
                serde_json::to_value(v).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect()
}

impl VectorStore for QdrantVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            if exists {
                return Ok(());
            }
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&collection)
                        .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
                )
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .collection_exists(&collection)
                .await
                .map_err(|e| StoreError::Collection(e.to_string()))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            self.client
                .delete_collection(&collection)
                .await
                .map_err(|e| StoreError::Delete(e.to_string()))?;
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
            let mut qdrant_points = Vec::with_capacity(points.len());
            for p in points {
                let payload = to_qdrant_payload(p.payload)?;
                qdrant_points.push(PointStruct::new(to_point_id(&p.id), p.vector, payload));
            }
            self.client
                .upsert_points(UpsertPointsBuilder::new(&collection, qdrant_points))
                .await
                .map_err(|e| StoreError::Upsert(e.to_string()))?;
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
            let results = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&collection, vector, limit).with_payload(true),
                )
                .await
                .map_err(|e| StoreError::Search(e.to_string()))?;

            Ok(results
                .result
                .iter()
                .map(|point| ScoredPoint {
                    id: from_point_id(point.id.as_ref()),
                    score: point.score,
                    payload: from_qdrant_payload(&point.payload),
                })
                .collect())
        })
    }
}
