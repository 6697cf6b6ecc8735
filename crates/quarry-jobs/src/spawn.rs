//! Worker spawn boundary: one worker process per analyzer.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::Mutex;

use crate::error::JobError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait WorkerSpawner: Send + Sync {
    /// Launch a worker for `analyzer_id` against `source_url`.
    fn spawn(&self, analyzer_id: &str, source_url: &str)
    -> BoxFuture<'_, Result<(), JobError>>;

    /// Stop the worker for `analyzer_id`, if one is running.
    fn terminate(&self, analyzer_id: &str) -> BoxFuture<'_, Result<(), JobError>>;
}

/// Launches the current executable's `worker` subcommand as a child
/// process, handing it the analyzer id and store connection info.
pub struct ProcessSpawner {
    program: PathBuf,
    store_path: String,
    workdir: PathBuf,
    children: Mutex<HashMap<String, tokio::process::Child>>,
}

impl ProcessSpawner {
    #[must_use]
    pub fn new(program: PathBuf, store_path: &str, workdir: PathBuf) -> Self {
        Self {
            program,
            store_path: store_path.to_owned(),
            workdir,
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl std::fmt::Debug for ProcessSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSpawner")
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl WorkerSpawner for ProcessSpawner {
    fn spawn(
        &self,
        analyzer_id: &str,
        source_url: &str,
    ) -> BoxFuture<'_, Result<(), JobError>> {
        let analyzer_id = analyzer_id.to_owned();
        let source_url = source_url.to_owned();
        Box::pin(async move {
            let child = tokio::process::Command::new(&self.program)
                .arg("worker")
                .arg("--analyzer-id")
                .arg(&analyzer_id)
                .env("QUARRY_STORE_PATH", &self.store_path)
                .env("QUARRY_ANALYZER_ID", &analyzer_id)
                .env("QUARRY_SOURCE_URL", &source_url)
                .current_dir(&self.workdir)
                .spawn()
                .map_err(|e| JobError::Spawn(e.to_string()))?;
            tracing::info!(analyzer_id = %analyzer_id, pid = child.id(), "worker spawned");
            self.children.lock().await.insert(analyzer_id, child);
            Ok(())
        })
    }

    fn terminate(&self, analyzer_id: &str) -> BoxFuture<'_, Result<(), JobError>> {
        let analyzer_id = analyzer_id.to_owned();
        Box::pin(async move {
            if let Some(mut child) = self.children.lock().await.remove(&analyzer_id) {
                child
                    .start_kill()
                    .map_err(|e| JobError::Spawn(e.to_string()))?;
                tracing::info!(analyzer_id = %analyzer_id, "worker terminated");
            }
            Ok(())
        })
    }
}

/// Spawner that records requests without launching anything. Used by tests
/// and single-process setups where the worker runs in a local task.
#[derive(Debug, Default)]
pub struct NoopSpawner {
    spawned: std::sync::Mutex<Vec<String>>,
}

impl NoopSpawner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn spawned_ids(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }
}

impl WorkerSpawner for NoopSpawner {
    fn spawn(
        &self,
        analyzer_id: &str,
        _source_url: &str,
    ) -> BoxFuture<'_, Result<(), JobError>> {
        let analyzer_id = analyzer_id.to_owned();
        Box::pin(async move {
            self.spawned.lock().unwrap().push(analyzer_id);
            Ok(())
        })
    }

    fn terminate(&self, _analyzer_id: &str) -> BoxFuture<'_, Result<(), JobError>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_spawner_records_ids() {
        let spawner = NoopSpawner::new();
        spawner
            .spawn("abc", "https://github.com/octo/webapp")
            .await
            .unwrap();
        assert_eq!(spawner.spawned_ids(), vec!["abc"]);
    }

    #[tokio::test]
    async fn noop_terminate_is_ok() {
        let spawner = NoopSpawner::new();
        assert!(spawner.terminate("missing").await.is_ok());
    }

    #[tokio::test]
    async fn process_spawner_reports_missing_program() {
        let spawner = ProcessSpawner::new(
            PathBuf::from("/nonexistent/quarry-binary"),
            "quarry-coord.db",
            std::env::temp_dir(),
        );
        let err = spawner
            .spawn("abc", "https://github.com/octo/webapp")
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Spawn(_)));
    }

    #[tokio::test]
    async fn process_terminate_unknown_id_is_ok() {
        let spawner = ProcessSpawner::new(
            PathBuf::from("/nonexistent/quarry-binary"),
            "quarry-coord.db",
            std::env::temp_dir(),
        );
        assert!(spawner.terminate("missing").await.is_ok());
    }
}
