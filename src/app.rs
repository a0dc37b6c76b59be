//! Application wiring shared by the CLI and the HTTP server.
//!
//! [`App`] owns the providers, the retriever handle, chat memory and the
//! indexing pipeline, and exposes the two operations callers need:
//! [`App::index_sources`] and [`App::chat`].

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::embedding::{Embedder, GeminiEmbedder};
use crate::error::{RagError, Result};
use crate::gemini::GeminiClient;
use crate::generate::{GenerationSettings, Generator};
use crate::handle::IndexHandle;
use crate::index::VectorIndex;
use crate::ingest::{read_manifest, IndexingReport, Pipeline};
use crate::llm::{ChatModel, GeminiChat};
use crate::loader::LoaderOptions;
use crate::memory::ChatMemory;
use crate::models::{ChatAnswer, SessionKey};
use crate::tokenize::{load_tokenizer, TextTokenizer, TokenizerSpec};

pub struct App {
    config: Config,
    embedder: Arc<dyn Embedder>,
    handle: IndexHandle,
    memory: ChatMemory,
    generator: Generator,
    pipeline: Pipeline,
    open_lock: Mutex<()>,
}

impl App {
    /// Build an app talking to Gemini, with the configured tokenizer.
    pub async fn from_config(config: Config) -> Result<Self> {
        let client = GeminiClient::from_config(&config.provider)?;
        let embedder = Arc::new(GeminiEmbedder::new(client.clone(), &config.provider));
        let chat = Arc::new(GeminiChat::new(client, &config.provider));
        let tokenizer = load_tokenizer(&TokenizerSpec::parse(&config.chunking.tokenizer)).await?;
        Self::with_providers(config, embedder, chat, tokenizer).await
    }

    /// Build an app from explicit providers. An existing index is installed
    /// only if it holds chunks; an empty one leaves the app not ready.
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        tokenizer: Arc<dyn TextTokenizer>,
    ) -> Result<Self> {
        let memory = ChatMemory::open(&config.store.history_path, config.memory.window_pairs).await?;
        let generator = Generator::new(chat, GenerationSettings::from_config(&config));
        let pipeline = Pipeline::new(
            &LoaderOptions::from_config(&config.provider),
            tokenizer,
            config.chunking.chunk_size,
            config.chunking.chunk_overlap,
        )?;

        let handle = IndexHandle::empty();
        if VectorIndex::exists(&config.store.persist_dir) {
            let index = VectorIndex::open(
                &config.store.persist_dir,
                embedder.clone(),
                config.index.dedupe,
            )
            .await?;
            let chunks = index.count().await?;
            if chunks > 0 {
                tracing::info!(chunks, "existing index loaded");
                handle.install(Arc::new(index));
            } else {
                tracing::info!("existing index is empty, waiting for the first indexing run");
                index.close().await;
            }
        }

        Ok(Self {
            config,
            embedder,
            handle,
            memory,
            generator,
            pipeline,
            open_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&self) -> &IndexHandle {
        &self.handle
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// Load, chunk and index `sources`, creating the index on first use.
    ///
    /// The index is created only once some source has loaded, so a batch
    /// where every source fails leaves the store untouched.
    pub async fn index_sources(&self, sources: &[String]) -> Result<IndexingReport> {
        if sources.iter().all(|s| s.trim().is_empty()) {
            return Err(RagError::InvalidInput("urls must not be empty".into()));
        }

        let outcome = self.pipeline.load(sources).await?;
        let index = self.current_or_open().await?;
        self.pipeline.store(&index, outcome).await
    }

    async fn current_or_open(&self) -> Result<Arc<VectorIndex>> {
        let _guard = self.open_lock.lock().await;
        if let Some(index) = self.handle.current() {
            return Ok(index);
        }
        let index = Arc::new(
            VectorIndex::open(
                &self.config.store.persist_dir,
                self.embedder.clone(),
                self.config.index.dedupe,
            )
            .await?,
        );
        self.handle.install(index.clone());
        tracing::info!(path = %index.path().display(), "vector index created");
        Ok(index)
    }

    /// Answer `query` for `user_id`, starting a new session when none is given.
    pub async fn chat(
        &self,
        query: &str,
        user_id: &str,
        session_id: Option<String>,
    ) -> Result<(ChatAnswer, SessionKey)> {
        if user_id.trim().is_empty() {
            return Err(RagError::InvalidInput("user_id must not be empty".into()));
        }
        let key = match session_id.filter(|s| !s.trim().is_empty()) {
            Some(session_id) => SessionKey::new(user_id, session_id),
            None => SessionKey::generate(user_id),
        };

        let index = self.handle.snapshot()?;
        let answer = self
            .generator
            .generate(&index, &self.memory, &key, query)
            .await?;
        Ok((answer, key))
    }

    /// Index the configured manifest if the index is missing or empty.
    ///
    /// Returns `None` when there was nothing to do.
    pub async fn cold_start(&self) -> Result<Option<IndexingReport>> {
        let Some(path) = self.config.manifest.path.clone() else {
            return Ok(None);
        };
        if let Some(index) = self.handle.current() {
            if !index.is_empty().await? {
                return Ok(None);
            }
        }

        let sources = read_manifest(&path)?;
        tracing::info!(manifest = %path.display(), sources = sources.len(), "cold start indexing");
        self.index_sources(&sources).await.map(Some)
    }

    /// Apply `memory.retention_days`, if set. Returns turns removed.
    pub async fn prune_history(&self) -> Result<u64> {
        let Some(days) = self.config.memory.retention_days else {
            return Ok(0);
        };
        let cutoff = i64::try_from(days)
            .ok()
            .and_then(chrono::Duration::try_days)
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            tracing::warn!(retention_days = days, "retention period out of range, not pruning");
            return Ok(0);
        };
        let removed = self.memory.prune_older_than(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, retention_days = days, "pruned chat history");
        }
        Ok(removed)
    }

    /// Chunk count of the current index, if one is installed.
    pub async fn indexed_chunks(&self) -> Result<Option<i64>> {
        match self.handle.current() {
            Some(index) => Ok(Some(index.count().await?)),
            None => Ok(None),
        }
    }
}
