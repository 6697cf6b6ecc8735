//! Analyzer jobs: one per repository indexing run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use quarry_store::CoordStore;

use crate::error::JobError;
use crate::query::{Query, QueryStatus};

/// Lifecycle of an indexing run. `Ready` is the steady state while the
/// worker serves queries; `Done` terminates only the metadata-only path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerStatus {
    Requested,
    Spawned,
    Cloning,
    Processing,
    Ready,
    Done,
    Error,
}

impl AnalyzerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Spawned => "SPAWNED",
            Self::Cloning => "CLONING",
            Self::Processing => "PROCESSING",
            Self::Ready => "READY",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(Self::Requested),
            "SPAWNED" => Some(Self::Spawned),
            "CLONING" => Some(Self::Cloning),
            "PROCESSING" => Some(Self::Processing),
            "READY" => Some(Self::Ready),
            "DONE" => Some(Self::Done),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Position in the forward progression, used to refuse regressions.
    fn ordinal(self) -> u8 {
        match self {
            Self::Requested => 0,
            Self::Spawned => 1,
            Self::Cloning => 2,
            Self::Processing => 3,
            Self::Ready => 4,
            Self::Done => 5,
            Self::Error => 6,
        }
    }
}

impl std::fmt::Display for AnalyzerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata payload recorded once the repository has been scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub paths: Vec<String>,
    pub tree: String,
}

/// Queued payload for one query, carried through the per-analyzer queue.
#[derive(Debug, Serialize, Deserialize)]
struct QueuedQuery {
    id: String,
    text: String,
}

/// Handle to one analyzer job; all state lives in the coordination store.
#[derive(Clone)]
pub struct Analyzer {
    id: String,
    store: Arc<dyn CoordStore>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer").field("id", &self.id).finish()
    }
}

impl Analyzer {
    /// Register a new analyzer for `source_url` in status `Requested`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store writes fail.
    pub async fn create(store: Arc<dyn CoordStore>, source_url: &str) -> Result<Self, JobError> {
        let analyzer = Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            store,
        };
        analyzer
            .store
            .set(&analyzer.url_key(), source_url)
            .await?;
        analyzer
            .store
            .set(
                &analyzer.status_key(),
                AnalyzerStatus::Requested.as_str(),
            )
            .await?;
        Ok(analyzer)
    }

    #[must_use]
    pub fn from_id(store: Arc<dyn CoordStore>, id: &str) -> Self {
        Self {
            id: id.to_owned(),
            store,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The repository URL this analyzer was created for.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn source_url(&self) -> Result<Option<String>, JobError> {
        Ok(self.store.get(&self.url_key()).await?)
    }

    /// Record a status, ignoring writes that would move backwards.
    /// `Error` is always allowed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read or write fails.
    pub async fn set_status(&self, status: AnalyzerStatus) -> Result<(), JobError> {
        if status != AnalyzerStatus::Error
            && let Some(current) = self.status().await?
            && status.ordinal() < current.ordinal()
        {
            tracing::warn!(
                analyzer_id = %self.id,
                current = %current,
                requested = %status,
                "ignoring status regression"
            );
            return Ok(());
        }
        tracing::info!(analyzer_id = %self.id, status = %status, "analyzer status");
        self.store.set(&self.status_key(), status.as_str()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn status(&self) -> Result<Option<AnalyzerStatus>, JobError> {
        let raw = self.store.get(&self.status_key()).await?;
        Ok(raw.as_deref().and_then(AnalyzerStatus::parse))
    }

    /// # Errors
    ///
    /// Returns an error if serialization or the store write fails.
    pub async fn set_result(&self, result: &AnalyzerResult) -> Result<(), JobError> {
        let json = serde_json::to_string(result)?;
        self.store.set(&self.result_key(), &json).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store read or deserialization fails.
    pub async fn result(&self) -> Result<Option<AnalyzerResult>, JobError> {
        match self.store.get(&self.result_key()).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Create a query against this analyzer and enqueue it for the worker.
    /// Only legal while the analyzer is `Ready`.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the last recorded status is `Ready`; store
    /// failures otherwise.
    pub async fn enqueue_query(&self, text: &str) -> Result<Query, JobError> {
        match self.status().await? {
            Some(AnalyzerStatus::Ready) => {}
            other => {
                return Err(JobError::InvalidState(format!(
                    "analyzer {} is {:?}, not READY",
                    self.id, other
                )));
            }
        }

        let query = Query::create(Arc::clone(&self.store), &self.id, text);
        query.set_status(QueryStatus::Requested).await?;

        let payload = serde_json::to_string(&QueuedQuery {
            id: query.id().to_owned(),
            text: text.to_owned(),
        })?;
        self.store.push(&self.queue_key(), &payload).await?;
        self.store.push(&self.query_ids_key(), query.id()).await?;
        tracing::info!(analyzer_id = %self.id, query_id = %query.id(), "query enqueued");
        Ok(query)
    }

    /// Pop the next queued query, if any. Single consumer: the worker loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the store pop or payload decode fails.
    pub async fn next_query(&self) -> Result<Option<Query>, JobError> {
        let Some(payload) = self.store.pop(&self.queue_key()).await? else {
            return Ok(None);
        };
        let queued: QueuedQuery = serde_json::from_str(&payload)?;
        Ok(Some(Query::restore(
            Arc::clone(&self.store),
            &queued.id,
            &self.id,
            &queued.text,
        )))
    }

    /// Delete this analyzer and cascade to all of its queries.
    ///
    /// # Errors
    ///
    /// Returns an error if store deletes fail.
    pub async fn teardown(&self) -> Result<usize, JobError> {
        let mut removed = 0;
        while let Some(query_id) = self.store.pop(&self.query_ids_key()).await? {
            removed += self
                .store
                .delete_prefix(&Query::key_prefix(&query_id))
                .await?;
        }
        removed += self.store.delete_prefix(&self.key_prefix()).await?;
        tracing::info!(analyzer_id = %self.id, removed, "analyzer torn down");
        Ok(removed)
    }

    fn key_prefix(&self) -> String {
        format!("analyzer:{}:", self.id)
    }

    fn status_key(&self) -> String {
        format!("{}status", self.key_prefix())
    }

    fn url_key(&self) -> String {
        format!("{}url", self.key_prefix())
    }

    fn result_key(&self) -> String {
        format!("{}result", self.key_prefix())
    }

    fn queue_key(&self) -> String {
        format!("{}queries", self.key_prefix())
    }

    fn query_ids_key(&self) -> String {
        format!("{}query_ids", self.key_prefix())
    }
}
