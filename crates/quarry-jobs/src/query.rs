//! Query jobs: one per question against a READY analyzer.

use std::sync::Arc;

use quarry_agent::AnswerReport;
use quarry_store::CoordStore;

use crate::error::JobError;

/// Query lifecycle. The four middle states are the agent's stage markers,
/// surfaced so pollers can show where a long answer run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Requested,
    GenReadme,
    EnhancePrompt,
    GenCodeContext,
    Answering,
    Done,
    Error,
}

impl QueryStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::GenReadme => "GEN_README",
            Self::EnhancePrompt => "ENHANCE_PROMPT",
            Self::GenCodeContext => "GEN_CODE_CONTEXT",
            Self::Answering => "ANSWERING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUESTED" => Some(Self::Requested),
            "GEN_README" => Some(Self::GenReadme),
            "ENHANCE_PROMPT" => Some(Self::EnhancePrompt),
            "GEN_CODE_CONTEXT" => Some(Self::GenCodeContext),
            "ANSWERING" => Some(Self::Answering),
            "DONE" => Some(Self::Done),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to one query job; status and result live in the coordination store.
#[derive(Clone)]
pub struct Query {
    id: String,
    analyzer_id: String,
    text: String,
    store: Arc<dyn CoordStore>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.id)
            .field("analyzer_id", &self.analyzer_id)
            .finish_non_exhaustive()
    }
}

impl Query {
    #[must_use]
    pub fn create(store: Arc<dyn CoordStore>, analyzer_id: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            analyzer_id: analyzer_id.to_owned(),
            text: text.to_owned(),
            store,
        }
    }

    /// Rehydrate a dequeued query.
    #[must_use]
    pub fn restore(store: Arc<dyn CoordStore>, id: &str, analyzer_id: &str, text: &str) -> Self {
        Self {
            id: id.to_owned(),
            analyzer_id: analyzer_id.to_owned(),
            text: text.to_owned(),
            store,
        }
    }

    /// Handle for status/result polling by id alone.
    #[must_use]
    pub fn from_id(store: Arc<dyn CoordStore>, id: &str) -> Self {
        Self {
            id: id.to_owned(),
            analyzer_id: String::new(),
            text: String::new(),
            store,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn analyzer_id(&self) -> &str {
        &self.analyzer_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn key_prefix(id: &str) -> String {
        format!("query:{id}:")
    }

    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn exists(&self) -> Result<bool, JobError> {
        Ok(self.store.exists(&self.status_key()).await?)
    }

    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn set_status(&self, status: QueryStatus) -> Result<(), JobError> {
        tracing::info!(query_id = %self.id, status = %status, "query status");
        self.store.set(&self.status_key(), status.as_str()).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn status(&self) -> Result<Option<QueryStatus>, JobError> {
        let raw = self.store.get(&self.status_key()).await?;
        Ok(raw.as_deref().and_then(QueryStatus::parse))
    }

    /// Persist the answer and transition to `Done`. The result write lands
    /// before the status write, so a poller that observes `DONE` without a
    /// result is seeing a transient read, not a lost answer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the store writes fail.
    pub async fn set_result(&self, report: &AnswerReport) -> Result<(), JobError> {
        let json = serde_json::to_string(report)?;
        self.store.set(&self.result_key(), &json).await?;
        self.set_status(QueryStatus::Done).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the store read or deserialization fails.
    pub async fn result(&self) -> Result<Option<AnswerReport>, JobError> {
        match self.store.get(&self.result_key()).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn status_key(&self) -> String {
        format!("{}status", Self::key_prefix(&self.id))
    }

    fn result_key(&self) -> String {
        format!("{}result", Self::key_prefix(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use quarry_store::memory::InMemoryCoordStore;

    use super::*;

    fn store() -> Arc<dyn CoordStore> {
        Arc::new(InMemoryCoordStore::new())
    }

    fn report() -> AnswerReport {
        AnswerReport {
            answers: vec!["the answer".into()],
            summarized_readme: String::new(),
            enhanced_query: String::new(),
            search_sentences: vec![],
            hits: vec![],
            context: vec![],
        }
    }

    #[test]
    fn status_roundtrips_through_strings() {
        for status in [
            QueryStatus::Requested,
            QueryStatus::GenReadme,
            QueryStatus::EnhancePrompt,
            QueryStatus::GenCodeContext,
            QueryStatus::Answering,
            QueryStatus::Done,
            QueryStatus::Error,
        ] {
            assert_eq!(QueryStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(QueryStatus::Done.is_terminal());
        assert!(QueryStatus::Error.is_terminal());
        assert!(!QueryStatus::Answering.is_terminal());
    }

    #[tokio::test]
    async fn fresh_query_does_not_exist() {
        let q = Query::create(store(), "a1", "why?");
        assert!(!q.exists().await.unwrap());
    }

    #[tokio::test]
    async fn done_implies_result_present() {
        let q = Query::create(store(), "a1", "why?");
        q.set_status(QueryStatus::Requested).await.unwrap();
        assert!(q.result().await.unwrap().is_none());

        q.set_result(&report()).await.unwrap();
        assert_eq!(q.status().await.unwrap(), Some(QueryStatus::Done));
        let stored = q.result().await.unwrap().unwrap();
        assert_eq!(stored.answers, vec!["the answer"]);
    }

    #[tokio::test]
    async fn from_id_polls_shared_state() {
        let s = store();
        let q = Query::create(Arc::clone(&s), "a1", "why?");
        q.set_status(QueryStatus::Answering).await.unwrap();

        let poller = Query::from_id(s, q.id());
        assert_eq!(poller.status().await.unwrap(), Some(QueryStatus::Answering));
    }
}
