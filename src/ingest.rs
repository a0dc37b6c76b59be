//! Indexing pipeline: sources → documents → chunks → vector index.
//!
//! The stages are exposed separately so callers can defer opening the index
//! until at least one source has loaded. [`Pipeline::run`] composes them for
//! an index that already exists.
//!
//! Also reads the cold-start manifest: a JSON file listing sources under the
//! `"documents"` key.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::Deserialize;

use crate::chunk::chunk_documents;
use crate::error::{RagError, Result};
use crate::index::{AddReport, VectorIndex};
use crate::loader::{LoadOutcome, Loader, LoaderOptions, SourceFailure};
use crate::models::{Chunk, Document};
use crate::tokenize::TextTokenizer;

/// Summary of one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexingReport {
    pub documents: usize,
    pub chunks: usize,
    pub added: usize,
    pub skipped: usize,
    pub failures: Vec<SourceFailure>,
}

pub struct Pipeline {
    loader: Loader,
    tokenizer: Arc<dyn TextTokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Pipeline {
    pub fn new(
        options: &LoaderOptions,
        tokenizer: Arc<dyn TextTokenizer>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            loader: Loader::new(options)?,
            tokenizer,
            chunk_size,
            chunk_overlap,
        })
    }

    /// Load sources, skipping failures. Errors if none load.
    pub async fn load(&self, sources: &[String]) -> Result<LoadOutcome> {
        self.loader.load_all(sources).await
    }

    /// Split documents into chunks off the async workers.
    pub async fn chunk(&self, documents: Vec<Document>) -> Result<Vec<Chunk>> {
        let tokenizer = self.tokenizer.clone();
        let (size, overlap) = (self.chunk_size, self.chunk_overlap);
        tokio::task::spawn_blocking(move || {
            chunk_documents(&documents, tokenizer.as_ref(), size, overlap)
        })
        .await
        .map_err(|e| anyhow::anyhow!("chunking task failed: {}", e))?
    }

    /// Load, chunk and add `sources` to `index`.
    pub async fn run(&self, index: &VectorIndex, sources: &[String]) -> Result<IndexingReport> {
        let outcome = self.load(sources).await?;
        self.store(index, outcome).await
    }

    /// Chunk loaded documents and add them to `index`.
    pub async fn store(&self, index: &VectorIndex, outcome: LoadOutcome) -> Result<IndexingReport> {
        let started = Instant::now();
        let documents = outcome.documents.len();
        let chunks = self.chunk(outcome.documents).await?;
        let AddReport { added, skipped } = index.add(&chunks).await?;

        tracing::info!(
            documents,
            chunks = chunks.len(),
            added,
            skipped,
            failed_sources = outcome.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "indexing complete"
        );

        Ok(IndexingReport {
            documents,
            chunks: chunks.len(),
            added,
            skipped,
            failures: outcome.failures,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    documents: Vec<String>,
}

/// Read the source list from a manifest file.
pub fn read_manifest(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
    Ok(manifest.documents)
}
