//! TOML configuration parsing and validation.
//!
//! All settings live in one file (default `./config/onboard.toml`). Every
//! section except `[store]` has defaults, so a minimal config only names
//! where the index and the chat history are kept:
//!
//! ```toml
//! [store]
//! persist_dir = "./data/index"
//! history_path = "./data/history.sqlite"
//! ```
//!
//! Secrets are not read from the file: the provider API key comes from the
//! `GOOGLE_API_KEY` environment variable and `USER_AGENT` overrides
//! `provider.user_agent`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the vector index (`index.sqlite`).
    pub persist_dir: PathBuf,
    /// SQLite file holding chat history.
    pub history_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// `"words"`, `"hf:<repo>"`, or a path to a `tokenizer.json`.
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_tokenizer() -> String {
    "hf:Xenova/text-embedding-ada-002".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f32,
    #[serde(default)]
    pub max_context_chars: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_k: default_fetch_k(),
            mmr_lambda: default_mmr_lambda(),
            max_context_chars: None,
        }
    }
}

fn default_k() -> usize {
    10
}
fn default_fetch_k() -> usize {
    20
}
fn default_mmr_lambda() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_true")]
    pub dedupe: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { dedupe: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_embedding_model() -> String {
    "models/embedding-001".to_string()
}
fn default_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_user_agent() -> String {
    concat!("onboard-rag/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ProviderConfig {
    /// User agent for web fetches; the `USER_AGENT` env var wins over the file.
    pub fn effective_user_agent(&self) -> String {
        std::env::var("USER_AGENT")
            .ok()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or_else(|| self.user_agent.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    #[serde(default = "default_window_pairs")]
    pub window_pairs: usize,
    #[serde(default)]
    pub retention_days: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_pairs: default_window_pairs(),
            retention_days: None,
        }
    }
}

/// Upper bound for `memory.retention_days` (about a century).
pub const MAX_RETENTION_DAYS: u64 = 36_500;

fn default_window_pairs() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_institution")]
    pub institution: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            institution: default_institution(),
        }
    }
}

fn default_institution() -> String {
    "IIIT Bangalore (IIITB)".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:8080".to_string(),
        "http://127.0.0.1:8000".to_string(),
    ]
}
fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ManifestConfig {
    /// JSON file listing sources under the `"documents"` key.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// A config with every default and the given storage root.
    pub fn with_root(root: &Path) -> Self {
        Self {
            store: StoreConfig {
                persist_dir: root.join("index"),
                history_path: root.join("history.sqlite"),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            index: IndexConfig::default(),
            provider: ProviderConfig::default(),
            memory: MemoryConfig::default(),
            assistant: AssistantConfig::default(),
            server: ServerConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }
        if self.retrieval.k == 0 {
            anyhow::bail!("retrieval.k must be >= 1");
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            anyhow::bail!("retrieval.fetch_k must be >= retrieval.k");
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            anyhow::bail!("retrieval.mmr_lambda must be in [0.0, 1.0]");
        }
        if self.memory.window_pairs == 0 {
            anyhow::bail!("memory.window_pairs must be >= 1");
        }
        if let Some(days) = self.memory.retention_days {
            if days == 0 || days > MAX_RETENTION_DAYS {
                anyhow::bail!(
                    "memory.retention_days must be between 1 and {}",
                    MAX_RETENTION_DAYS
                );
            }
        }
        if self.provider.batch_size == 0 {
            anyhow::bail!("provider.batch_size must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
