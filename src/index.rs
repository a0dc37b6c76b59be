//! Persistent vector index over document chunks.
//!
//! Chunks, their metadata and their embeddings live in one SQLite file under
//! `store.persist_dir`. Search is brute force: every stored vector is scored
//! against the query in Rust, then [`crate::search::select`] applies the
//! ranking strategy.
//!
//! # Writes
//!
//! [`VectorIndex::add`] embeds before it writes and commits each call in one
//! transaction, so a failed batch leaves the index unchanged. Writers are
//! serialised by an async mutex; readers never block on it.
//!
//! With deduplication on, a chunk whose `(source, hash)` pair is already
//! stored (or repeated earlier in the same batch) is skipped before any
//! embedding request is made.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::{Chunk, DocumentMetadata, RetrievedChunk};
use crate::search::{self, Candidate, SearchStrategy};

/// Counts from one [`VectorIndex::add`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddReport {
    pub added: usize,
    pub skipped: usize,
}

pub struct VectorIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    dedupe: bool,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl VectorIndex {
    /// Open the index in `persist_dir`, creating it if missing.
    pub async fn open(persist_dir: &Path, embedder: Arc<dyn Embedder>, dedupe: bool) -> Result<Self> {
        let path = db::index_path(persist_dir);
        let pool = db::connect(&path).await?;
        migrate::migrate_index(&pool).await?;
        tracing::debug!(path = %path.display(), "vector index opened");
        Ok(Self {
            pool,
            embedder,
            dedupe,
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Whether an index database already exists in `persist_dir`.
    pub fn exists(persist_dir: &Path) -> bool {
        db::index_path(persist_dir).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed and store `chunks`.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<AddReport> {
        let _guard = self.write_lock.lock().await;

        let pending = if self.dedupe {
            self.filter_known(chunks).await?
        } else {
            chunks.iter().collect()
        };
        let skipped = chunks.len() - pending.len();
        if pending.is_empty() {
            return Ok(AddReport { added: 0, skipped });
        }

        let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != pending.len() {
            return Err(RagError::Provider(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pending.len()
            )));
        }

        let model = self.embedder.model_name().to_string();
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (chunk, vector) in pending.iter().zip(vectors.iter()) {
            let metadata_json = serde_json::to_string(&chunk.metadata)
                .map_err(|e| anyhow::anyhow!("failed to encode chunk metadata: {}", e))?;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, chunk_index, content, metadata_json, hash, model, dims, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(&chunk.hash)
            .bind(&model)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        let report = AddReport {
            added: pending.len(),
            skipped,
        };
        tracing::info!(added = report.added, skipped = report.skipped, "chunks indexed");
        Ok(report)
    }

    /// Drop chunks whose `(source, hash)` is stored or already seen in this batch.
    async fn filter_known<'a>(&self, chunks: &'a [Chunk]) -> Result<Vec<&'a Chunk>> {
        let sources: HashSet<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
        let mut known: HashSet<(String, String)> = HashSet::new();
        for source in sources {
            let rows = sqlx::query("SELECT hash FROM chunks WHERE source = ?")
                .bind(source)
                .fetch_all(&self.pool)
                .await?;
            for row in rows {
                known.insert((source.to_string(), row.get("hash")));
            }
        }

        Ok(chunks
            .iter()
            .filter(|c| known.insert((c.metadata.source.clone(), c.hash.clone())))
            .collect())
    }

    /// Return up to `k` chunks relevant to `query`. An empty index yields `[]`.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        strategy: SearchStrategy,
    ) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_query(query).await?;

        let rows = sqlx::query("SELECT id, content, metadata_json, embedding FROM chunks")
            .fetch_all(&self.pool)
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .map_err(|e| anyhow::anyhow!("corrupt metadata for chunk {}: {}", id, e))?;
            let blob: Vec<u8> = row.get("embedding");
            candidates.push(Candidate {
                chunk: RetrievedChunk {
                    chunk_id: id,
                    content: row.get("content"),
                    metadata,
                    score: 0.0,
                },
                vector: blob_to_vec(&blob),
            });
        }

        Ok(search::select(&query_vec, candidates, k, strategy))
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.count().await? == 0)
    }

    /// Distinct sources with their chunk counts, alphabetically.
    pub async fn sources(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS chunks FROM chunks GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("source"), row.get("chunks")))
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
