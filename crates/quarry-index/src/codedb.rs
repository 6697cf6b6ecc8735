//! The code index: persisted records with embedded descriptions and
//! cosine k-NN search, one vector-store collection per repository.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};

use quarry_llm::provider::LlmProvider;
use quarry_llm::tiered::{TieredProvider, estimate_tokens};
use quarry_store::vector::{ScoredPoint, VectorPoint};
use quarry_store::VectorStore;

use crate::budget::pack_batches;
use crate::chunker::{ChunkKind, FileChunks};
use crate::describe;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Function,
    Class,
}

impl RecordKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
        }
    }
}

/// One indexed function or class. `description` stays empty until the
/// description generator has run; the record is immutable once indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRecord {
    pub kind: RecordKind,
    pub path: String,
    pub name: String,
    pub body: String,
    pub description: String,
}

/// A search hit: similarity score plus the stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub score: f32,
    pub record: CodeRecord,
}

/// Flatten parsed files into the ordered record list that gets indexed:
/// every class at any depth (under its dotted container path) and every
/// top-level function.
#[must_use]
pub fn extract_records(files: &[FileChunks]) -> Vec<CodeRecord> {
    let mut records = Vec::new();
    for file in files {
        for idx in file.record_indices() {
            let node = &file.nodes()[idx];
            records.push(CodeRecord {
                kind: match node.kind {
                    ChunkKind::Function => RecordKind::Function,
                    ChunkKind::Class => RecordKind::Class,
                },
                path: file.path.clone(),
                name: file.qualified_name(idx),
                body: node.body.clone(),
                description: String::new(),
            });
        }
    }
    records
}

/// Repository-scoped code index over a vector store and a tiered LLM.
#[derive(Clone)]
pub struct CodeDb<P: LlmProvider + Clone> {
    vectors: Arc<dyn VectorStore>,
    llm: TieredProvider<P>,
    namespace: String,
}

impl<P: LlmProvider + Clone> CodeDb<P> {
    #[must_use]
    pub fn new(vectors: Arc<dyn VectorStore>, llm: TieredProvider<P>, namespace: &str) -> Self {
        Self {
            vectors,
            llm,
            namespace: namespace.to_owned(),
        }
    }

    /// Collection name for this repository's namespace.
    #[must_use]
    pub fn collection(&self) -> String {
        let sanitized: String = self
            .namespace
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("codedb_{sanitized}")
    }

    /// Whether an index already exists for this repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector store cannot be reached.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.vectors.collection_exists(&self.collection()).await?)
    }

    /// Build the index: batch record bodies under the small-tier token
    /// ceiling, generate descriptions with bounded concurrency, embed all
    /// descriptions in one bulk call, and upsert every record.
    ///
    /// Idempotent: when the collection already exists this is a no-op that
    /// reuses it, making zero LLM or embedding calls. Returns the number of
    /// records indexed.
    ///
    /// # Errors
    ///
    /// Propagates LLM transport and vector-store failures; description
    /// count mismatches degrade to empty descriptions instead of failing.
    pub async fn build(&self, records: Vec<CodeRecord>, parallelism: usize) -> Result<usize> {
        if self.exists().await? {
            tracing::info!(collection = %self.collection(), "reusing existing index");
            return Ok(0);
        }

        let ceiling = self
            .llm
            .small_limit()
            .saturating_sub(describe::prompt_overhead());
        let batches: Vec<Vec<CodeRecord>> =
            pack_batches(records, ceiling, |r| estimate_tokens(&r.body))
                .into_iter()
                .filter(|b| !b.is_empty())
                .collect();

        tracing::info!(
            batches = batches.len(),
            collection = %self.collection(),
            "generating descriptions"
        );

        // Each batch future owns its input slice and yields its own output
        // slice; `buffered` keeps completion results in batch order, so the
        // flattened descriptions line up with the flattened records.
        let llm = &self.llm;
        let batch_results: Vec<Result<Vec<String>>> = futures::stream::iter(
            batches.iter().map(|batch| {
                let bodies: Vec<String> = batch.iter().map(|r| r.body.clone()).collect();
                async move { describe::generate_descriptions(llm, &bodies).await }
            }),
        )
        .buffered(parallelism.max(1))
        .collect()
        .await;

        let mut descriptions = Vec::new();
        for result in batch_results {
            descriptions.extend(result?);
        }

        let mut records: Vec<CodeRecord> = batches.into_iter().flatten().collect();
        debug_assert_eq!(records.len(), descriptions.len());
        for (record, description) in records.iter_mut().zip(&descriptions) {
            record.description.clone_from(description);
        }

        tracing::info!(records = records.len(), "embedding descriptions");
        let embeddings = self.llm.embed(&descriptions).await?;
        let dimension = embeddings.first().map_or(1, Vec::len);

        self.vectors
            .ensure_collection(&self.collection(), dimension as u64)
            .await?;

        let points: Vec<VectorPoint> = records
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (record, vector))| VectorPoint {
                id: i.to_string(),
                vector,
                payload: record_payload(record),
            })
            .collect();
        if !points.is_empty() {
            self.vectors.upsert(&self.collection(), points).await?;
        }

        tracing::info!(records = records.len(), "index built");
        Ok(records.len())
    }

    /// k-nearest-neighbor search over the repository's records, ranked by
    /// cosine similarity descending.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or the search fails.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredRecord>> {
        let embedded = self.llm.embed(&[query.trim().to_owned()]).await?;
        let vector = embedded
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Other("query embedding missing".into()))?;

        let hits = self
            .vectors
            .search(&self.collection(), vector, k as u64)
            .await?;

        Ok(hits.iter().filter_map(record_from_point).collect())
    }

    /// Drop the repository's collection entirely (analyzer teardown).
    ///
    /// # Errors
    ///
    /// Returns an error if the vector store delete fails.
    pub async fn delete(&self) -> Result<()> {
        Ok(self.vectors.delete_collection(&self.collection()).await?)
    }
}

fn record_payload(record: &CodeRecord) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        ("kind".to_owned(), serde_json::json!(record.kind.as_str())),
        ("path".to_owned(), serde_json::json!(record.path)),
        ("name".to_owned(), serde_json::json!(record.name)),
        ("body".to_owned(), serde_json::json!(record.body)),
        (
            "description".to_owned(),
            serde_json::json!(record.description),
        ),
    ])
}

fn record_from_point(point: &ScoredPoint) -> Option<ScoredRecord> {
    let get = |key: &str| {
        point
            .payload
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    };
    let kind = match point.payload.get("kind").and_then(serde_json::Value::as_str) {
        Some("class") => RecordKind::Class,
        _ => RecordKind::Function,
    };
    Some(ScoredRecord {
        score: point.score,
        record: CodeRecord {
            kind,
            path: get("path")?,
            name: get("name")?,
            body: get("body")?,
            description: get("description").unwrap_or_default(),
        },
    })
}

#[cfg(test)]
mod tests {
    use quarry_llm::mock::MockProvider;
    use quarry_store::memory_vector::InMemoryVectorStore;

    use super::*;
    use crate::chunker::parse_file;
    use crate::describe::SEP_TOKEN;

    /// Toy embedder: a handful of keyword indicator dimensions, enough for
    /// cosine similarity to prefer overlapping vocabulary.
    fn keyword_embedder(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        ["post", "request", "resource", "file", "read", "write"]
            .iter()
            .map(|kw| if lower.contains(kw) { 1.0 } else { 0.01 })
            .collect()
    }

    fn record(name: &str, body: &str) -> CodeRecord {
        CodeRecord {
            kind: RecordKind::Function,
            path: "app.py".into(),
            name: name.into(),
            body: body.into(),
            description: String::new(),
        }
    }

    fn codedb(small: MockProvider) -> CodeDb<MockProvider> {
        let llm = TieredProvider::new(small, MockProvider::default(), 30_000, 100_000);
        CodeDb::new(Arc::new(InMemoryVectorStore::new()), llm, "octo/webapp")
    }

    #[test]
    fn collection_name_is_sanitized() {
        let db = codedb(MockProvider::default());
        assert_eq!(db.collection(), "codedb_octo_webapp");
    }

    #[test]
    fn extract_records_flattens_files() {
        let files = vec![
            parse_file("def top():\n    pass\n", "a.py").unwrap(),
            parse_file("class C:\n    def m(self):\n        pass\n", "b.py").unwrap(),
        ];
        let records = extract_records(&files);
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["top", "C"]);
        assert_eq!(records[0].kind, RecordKind::Function);
        assert_eq!(records[1].kind, RecordKind::Class);
        assert!(records.iter().all(|r| r.description.is_empty()));
    }

    #[tokio::test]
    async fn build_then_search_returns_relevant_record() {
        let small = MockProvider::with_responses(vec![format!(
            "Handles POST requests to create a resource{SEP_TOKEN}Reads and writes local files"
        )])
        .with_embed_fn(keyword_embedder);
        let db = codedb(small);

        let records = vec![
            record("create_item", "def create_item():\n    pass"),
            record("load_config", "def load_config():\n    pass"),
        ];
        let indexed = db.build(records, 4).await.unwrap();
        assert_eq!(indexed, 2);

        let hits = db.search("POST endpoint", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.name, "create_item");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn second_build_makes_zero_provider_calls() {
        let small = MockProvider::with_responses(vec!["a description".into()])
            .with_embed_fn(keyword_embedder);
        let db = codedb(small.clone());

        db.build(vec![record("f", "def f():\n    pass")], 2)
            .await
            .unwrap();
        let chat_after_first = small.chat_calls();
        let embed_after_first = small.embed_calls();

        let indexed = db
            .build(vec![record("f", "def f():\n    pass")], 2)
            .await
            .unwrap();
        assert_eq!(indexed, 0);
        assert_eq!(small.chat_calls(), chat_after_first);
        assert_eq!(small.embed_calls(), embed_after_first);
    }

    #[tokio::test]
    async fn descriptions_align_with_records_across_batches() {
        // Tiny small-tier limit forces one record per batch; sequential
        // processing (parallelism 1) keeps the scripted responses aligned.
        // Both tiers share the script so routing cannot desync it.
        let scripted = MockProvider::with_responses(vec![
            "first description".into(),
            "second description".into(),
        ])
        .with_embed_fn(keyword_embedder);
        let llm = TieredProvider::new(scripted.clone(), scripted, 60, 100_000);
        let db = CodeDb::new(Arc::new(InMemoryVectorStore::new()), llm, "octo/webapp");

        let records = vec![
            record("alpha", &"a".repeat(160)),
            record("beta", &"b".repeat(160)),
        ];
        db.build(records, 1).await.unwrap();

        let hits = db.search("anything", 2).await.unwrap();
        let by_name: HashMap<_, _> = hits
            .iter()
            .map(|h| (h.record.name.clone(), h.record.description.clone()))
            .collect();
        assert_eq!(by_name["alpha"], "first description");
        assert_eq!(by_name["beta"], "second description");
    }

    #[tokio::test]
    async fn empty_record_set_builds_without_llm_calls() {
        let small = MockProvider::default().with_embed_fn(keyword_embedder);
        let db = codedb(small.clone());
        let indexed = db.build(Vec::new(), 4).await.unwrap();
        assert_eq!(indexed, 0);
        assert_eq!(small.chat_calls(), 0);
        assert!(db.exists().await.unwrap());
    }

    #[tokio::test]
    async fn exists_false_before_build() {
        let db = codedb(MockProvider::default());
        assert!(!db.exists().await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_collection() {
        let small = MockProvider::with_responses(vec!["d".into()]).with_embed_fn(keyword_embedder);
        let db = codedb(small);
        db.build(vec![record("f", "def f():\n    pass")], 2)
            .await
            .unwrap();
        assert!(db.exists().await.unwrap());
        db.delete().await.unwrap();
        assert!(!db.exists().await.unwrap());
    }

    #[tokio::test]
    async fn transport_failure_aborts_build() {
        let small = MockProvider::failing().with_embed_fn(keyword_embedder);
        let db = codedb(small);
        let result = db.build(vec![record("f", "def f():\n    pass")], 2).await;
        assert!(result.is_err());
    }
}
