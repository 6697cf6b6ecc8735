//! quarry: index a repository into a searchable semantic store and answer
//! questions about it with retrieval-augmented generation.

mod config;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use quarry_agent::{AgentConfig, NoopProgress, RetrievalAgent};
use quarry_gateway::{AppState, GatewayServer};
use quarry_index::codedb::extract_records;
use quarry_index::repo::{Repository, parse_repository};
use quarry_index::CodeDb;
use quarry_jobs::{
    Analyzer, JobError, ProcessSpawner, Worker, WorkerConfig, WorkerSpawner,
};
use quarry_llm::openai::OpenAiProvider;
use quarry_llm::tiered::TieredProvider;
use quarry_store::memory::InMemoryCoordStore;
use quarry_store::memory_vector::InMemoryVectorStore;
use quarry_store::qdrant::QdrantVectorStore;
use quarry_store::sqlite::SqliteCoordStore;
use quarry_store::{CoordStore, VectorStore};

use crate::config::{Config, StoreBackend, VectorBackend};

#[derive(Parser)]
#[command(name = "quarry", version, about = "Repository question answering over a semantic code index")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "quarry.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP front door.
    Serve,
    /// Run one analyzer worker (normally spawned by the front door).
    Worker {
        #[arg(long)]
        analyzer_id: String,
    },
    /// Index a repository once and exit.
    Index { url: String },
    /// Index a repository (reusing an existing index) and answer one question.
    Ask { url: String, question: String },
}

type Llm = TieredProvider<OpenAiProvider>;

fn build_llm(cfg: &config::LlmConfig) -> Llm {
    let small = OpenAiProvider::new(
        cfg.api_key(),
        cfg.base_url.clone(),
        cfg.small_model.clone(),
        cfg.max_tokens,
        Some(cfg.embedding_model.clone()),
    );
    let large = OpenAiProvider::new(
        cfg.api_key(),
        cfg.base_url.clone(),
        cfg.large_model.clone(),
        cfg.max_tokens,
        None,
    );
    TieredProvider::new(small, large, cfg.small_limit, cfg.large_limit)
}

fn build_vectors(cfg: &config::VectorConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    Ok(match cfg.backend {
        VectorBackend::Memory => Arc::new(InMemoryVectorStore::new()),
        VectorBackend::Qdrant => Arc::new(QdrantVectorStore::connect(&cfg.url)?),
    })
}

async fn build_store(cfg: &config::StoreConfig) -> anyhow::Result<Arc<dyn CoordStore>> {
    Ok(match cfg.backend {
        StoreBackend::Memory => Arc::new(InMemoryCoordStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteCoordStore::connect(&cfg.sqlite_url()).await?),
    })
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Worker { analyzer_id } => run_worker(cfg, &analyzer_id).await,
        Command::Index { url } => index_once(cfg, &url).await,
        Command::Ask { url, question } => ask_once(cfg, &url, &question).await,
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let store = build_store(&cfg.store).await?;

    let spawner: Arc<dyn WorkerSpawner> = match cfg.store.backend {
        StoreBackend::Sqlite => Arc::new(ProcessSpawner::new(
            std::env::current_exe()?,
            &cfg.store.path,
            std::env::current_dir()?,
        )),
        // A memory store is invisible to child processes, so workers run
        // as tasks inside this process instead.
        StoreBackend::Memory => Arc::new(LocalSpawner::new(
            Arc::clone(&store),
            build_vectors(&cfg.vector)?,
            cfg.clone(),
        )),
    };

    let shutdown_rx = shutdown_on_ctrl_c();
    GatewayServer::new(
        &cfg.gateway.bind,
        cfg.gateway.port,
        AppState { store, spawner },
        shutdown_rx,
    )
    .serve()
    .await?;
    Ok(())
}

async fn run_worker(cfg: Config, analyzer_id: &str) -> anyhow::Result<()> {
    let store = build_store(&cfg.store).await?;
    let analyzer = Analyzer::from_id(Arc::clone(&store), analyzer_id);

    let source_url = match std::env::var("QUARRY_SOURCE_URL") {
        Ok(url) => url,
        Err(_) => analyzer
            .source_url()
            .await?
            .context("analyzer has no recorded source url")?,
    };

    let checkout = PathBuf::from(&cfg.worker.checkout_dir).join(analyzer_id);
    let repo = Repository::new(&source_url, checkout)?;
    let llm = build_llm(&cfg.llm);
    let codedb = CodeDb::new(build_vectors(&cfg.vector)?, llm.clone(), repo.id());
    let agent = RetrievalAgent::new(codedb.clone(), llm, AgentConfig::default());

    let mut worker = Worker::new(
        analyzer,
        repo,
        codedb,
        agent,
        WorkerConfig {
            parallelism: cfg.worker.parallelism,
            poll_interval: Duration::from_millis(cfg.worker.poll_interval_ms),
            metadata_only: false,
        },
        shutdown_on_ctrl_c(),
    );
    worker.run().await?;
    Ok(())
}

async fn index_once(cfg: Config, url: &str) -> anyhow::Result<()> {
    let (repo, codedb, _) = one_shot_setup(&cfg, url)?;
    repo.clone_if_missing().await?;
    let records = extract_records(&parse_repository(&repo));
    let indexed = codedb.build(records, cfg.worker.parallelism).await?;
    println!("indexed {indexed} records from {}", repo.id());
    Ok(())
}

async fn ask_once(cfg: Config, url: &str, question: &str) -> anyhow::Result<()> {
    let (repo, codedb, llm) = one_shot_setup(&cfg, url)?;
    repo.clone_if_missing().await?;
    let records = extract_records(&parse_repository(&repo));
    codedb.build(records, cfg.worker.parallelism).await?;

    let agent = RetrievalAgent::new(codedb, llm, AgentConfig::default());
    let readme = repo.readme().await;
    let report = agent
        .answer(readme.as_deref(), question, &NoopProgress)
        .await?;
    for answer in &report.answers {
        println!("{answer}");
    }
    Ok(())
}

fn one_shot_setup(cfg: &Config, url: &str) -> anyhow::Result<(Repository, CodeDb<OpenAiProvider>, Llm)> {
    let id = Repository::extract_id(url)
        .with_context(|| format!("cannot extract repository id from {url}"))?;
    let checkout = PathBuf::from(&cfg.worker.checkout_dir).join(id.replace('/', "_"));
    let repo = Repository::new(url, checkout)?;
    let llm = build_llm(&cfg.llm);
    let codedb = CodeDb::new(build_vectors(&cfg.vector)?, llm.clone(), repo.id());
    Ok((repo, codedb, llm))
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs workers as in-process tasks for the memory store backend.
struct LocalSpawner {
    store: Arc<dyn CoordStore>,
    vectors: Arc<dyn VectorStore>,
    cfg: Config,
    workers: tokio::sync::Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl LocalSpawner {
    fn new(store: Arc<dyn CoordStore>, vectors: Arc<dyn VectorStore>, cfg: Config) -> Self {
        Self {
            store,
            vectors,
            cfg,
            workers: tokio::sync::Mutex::new(HashMap::new()),
        }
    }
}

impl WorkerSpawner for LocalSpawner {
    fn spawn(&self, analyzer_id: &str, source_url: &str) -> BoxFuture<'_, Result<(), JobError>> {
        let analyzer_id = analyzer_id.to_owned();
        let source_url = source_url.to_owned();
        Box::pin(async move {
            let checkout = PathBuf::from(&self.cfg.worker.checkout_dir).join(&analyzer_id);
            let repo = Repository::new(&source_url, checkout)
                .map_err(|e| JobError::Spawn(e.to_string()))?;

            let llm = build_llm(&self.cfg.llm);
            let codedb = CodeDb::new(Arc::clone(&self.vectors), llm.clone(), repo.id());
            let agent = RetrievalAgent::new(codedb.clone(), llm, AgentConfig::default());
            let analyzer = Analyzer::from_id(Arc::clone(&self.store), &analyzer_id);

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let mut worker = Worker::new(
                analyzer,
                repo,
                codedb,
                agent,
                WorkerConfig {
                    parallelism: self.cfg.worker.parallelism,
                    poll_interval: Duration::from_millis(self.cfg.worker.poll_interval_ms),
                    metadata_only: false,
                },
                shutdown_rx,
            );
            let task_id = analyzer_id.clone();
            tokio::spawn(async move {
                if let Err(e) = worker.run().await {
                    tracing::error!(analyzer_id = %task_id, "local worker failed: {e}");
                }
            });
            self.workers.lock().await.insert(analyzer_id, shutdown_tx);
            Ok(())
        })
    }

    fn terminate(&self, analyzer_id: &str) -> BoxFuture<'_, Result<(), JobError>> {
        let analyzer_id = analyzer_id.to_owned();
        Box::pin(async move {
            if let Some(tx) = self.workers.lock().await.remove(&analyzer_id) {
                let _ = tx.send(true);
            }
            Ok(())
        })
    }
}
