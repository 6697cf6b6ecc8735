//! The per-analyzer worker: clone, index, then serve queries from the FIFO
//! queue until shutdown. Any failure past the happy path is a [`JobFatal`]:
//! the in-flight query and the analyzer are marked ERROR and the error
//! propagates so the process exits instead of self-healing.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;

use quarry_agent::{AgentError, AgentStage, Progress, RetrievalAgent};
use quarry_index::codedb::extract_records;
use quarry_index::overview::{directory_metadata, render_overview};
use quarry_index::repo::{Repository, parse_repository};
use quarry_index::CodeDb;
use quarry_llm::LlmProvider;

use crate::analyzer::{Analyzer, AnalyzerResult, AnalyzerStatus};
use crate::error::JobFatal;
use crate::query::{Query, QueryStatus};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent description/answer LLM calls.
    pub parallelism: usize,
    /// Sleep between queue polls when the queue is empty.
    pub poll_interval: Duration,
    /// Record repository metadata only, skip index build and queries.
    pub metadata_only: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parallelism: 8,
            poll_interval: Duration::from_millis(500),
            metadata_only: false,
        }
    }
}

/// One analyzer's worker process body.
pub struct Worker<P: LlmProvider + Clone> {
    analyzer: Analyzer,
    repo: Repository,
    codedb: CodeDb<P>,
    agent: RetrievalAgent<P>,
    config: WorkerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: LlmProvider + Clone> Worker<P> {
    #[must_use]
    pub fn new(
        analyzer: Analyzer,
        repo: Repository,
        codedb: CodeDb<P>,
        agent: RetrievalAgent<P>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            analyzer,
            repo,
            codedb,
            agent,
            config,
            shutdown_rx,
        }
    }

    /// Run to completion (metadata-only) or until shutdown.
    ///
    /// # Errors
    ///
    /// Returns the fatal error after recording ERROR on the analyzer.
    pub async fn run(&mut self) -> Result<(), JobFatal> {
        match self.run_inner().await {
            Ok(()) => Ok(()),
            Err(fatal) => {
                tracing::error!(analyzer_id = %self.analyzer.id(), "worker failed: {fatal}");
                if let Err(e) = self.analyzer.set_status(AnalyzerStatus::Error).await {
                    tracing::error!("failed to record analyzer ERROR status: {e}");
                }
                Err(fatal)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<(), JobFatal> {
        self.analyzer.set_status(AnalyzerStatus::Cloning).await?;
        self.repo.clone_if_missing().await?;

        self.analyzer.set_status(AnalyzerStatus::Processing).await?;
        let files = parse_repository(&self.repo);
        let result = AnalyzerResult {
            paths: self
                .repo
                .python_files()
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            tree: render_overview(self.repo.id(), &directory_metadata(&files)),
        };
        self.analyzer.set_result(&result).await?;

        if self.config.metadata_only {
            self.analyzer.set_status(AnalyzerStatus::Done).await?;
            return Ok(());
        }

        let records = extract_records(&files);
        tracing::info!(
            analyzer_id = %self.analyzer.id(),
            files = files.len(),
            records = records.len(),
            "building index"
        );
        self.codedb.build(records, self.config.parallelism).await?;
        self.analyzer.set_status(AnalyzerStatus::Ready).await?;

        let readme = self.repo.readme().await;
        self.poll_loop(readme.as_deref()).await
    }

    /// Cooperative poll loop: single consumer of this analyzer's queue.
    async fn poll_loop(&mut self, readme: Option<&str>) -> Result<(), JobFatal> {
        loop {
            if *self.shutdown_rx.borrow() {
                tracing::info!(analyzer_id = %self.analyzer.id(), "worker shutting down");
                return Ok(());
            }

            match self.analyzer.next_query().await? {
                Some(query) => {
                    if let Err(fatal) = self.process_query(&query, readme).await {
                        if let Err(e) = query.set_status(QueryStatus::Error).await {
                            tracing::error!("failed to record query ERROR status: {e}");
                        }
                        return Err(fatal);
                    }
                }
                None => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = self.shutdown_rx.changed() => {}
                    }
                }
            }
        }
    }

    async fn process_query(&self, query: &Query, readme: Option<&str>) -> Result<(), JobFatal> {
        tracing::info!(query_id = %query.id(), "processing query");
        let progress = QueryProgress { query };
        let report = self.agent.answer(readme, query.text(), &progress).await?;
        query.set_result(&report).await?;
        Ok(())
    }
}

/// Bridges agent stage transitions into the query's status record.
struct QueryProgress<'a> {
    query: &'a Query,
}

impl Progress for QueryProgress<'_> {
    fn stage(
        &self,
        stage: AgentStage,
    ) -> Pin<Box<dyn Future<Output = quarry_agent::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let status = match stage {
                AgentStage::GenReadme => QueryStatus::GenReadme,
                AgentStage::EnhancePrompt => QueryStatus::EnhancePrompt,
                AgentStage::GenCodeContext => QueryStatus::GenCodeContext,
                AgentStage::Answering => QueryStatus::Answering,
            };
            self.query
                .set_status(status)
                .await
                .map_err(|e| AgentError::Progress(e.to_string()))
        })
    }
}
