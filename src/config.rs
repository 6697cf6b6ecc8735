//! Configuration: TOML file with environment overrides and workable
//! defaults, so tests and single-process runs need no file at all.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub small_model: String,
    pub large_model: String,
    pub embedding_model: String,
    /// Token capacity of the small tier; batch ceilings derive from this.
    pub small_limit: usize,
    /// Token capacity of the large tier.
    pub large_limit: usize,
    /// Completion output cap per call.
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.lambdalabs.com/v1".into(),
            api_key_env: "QUARRY_API_KEY".into(),
            small_model: "qwen25-coder-32b-instruct".into(),
            large_model: "llama3.3-70b-instruct-fp8".into(),
            embedding_model: "text-embedding-3-small".into(),
            small_limit: 30_000,
            large_limit: 100_000,
            max_tokens: 2048,
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn api_key(&self) -> String {
        std::env::var(&self.api_key_env).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; only usable with in-process workers.
    Memory,
    /// Shared SQLite file; usable across worker processes.
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// SQLite database path (sqlite backend only).
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "quarry-coord.db".into(),
        }
    }
}

impl StoreConfig {
    /// Connection URL for the sqlite backend, creating the file if absent.
    #[must_use]
    pub fn sqlite_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub url: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            url: "http://localhost:6334".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSettings {
    pub parallelism: usize,
    pub poll_interval_ms: u64,
    /// Directory that receives one checkout per analyzer.
    pub checkout_dir: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            parallelism: 8,
            poll_interval_ms: 500,
            checkout_dir: "./checkouts".into(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_QDRANT_URL") {
            self.vector.url = v;
        }
        if let Ok(v) = std::env::var("QUARRY_STORE_PATH") {
            self.store.path = v;
        }
        if let Ok(v) = std::env::var("QUARRY_GATEWAY_PORT")
            && let Ok(port) = v.parse()
        {
            self.gateway.port = port;
        }
    }
}
