//! Embedding provider abstraction and the Gemini implementation.
//!
//! [`Embedder`] maps text to fixed-length vectors. Documents and queries are
//! embedded through separate methods because the provider tunes vectors by
//! task type (`RETRIEVAL_DOCUMENT` vs `RETRIEVAL_QUERY`).
//!
//! Also provides the vector utilities the index uses for storage and
//! brute-force search:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::gemini::{model_resource, GeminiClient};

/// Maps text to embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded next to each stored vector.
    fn model_name(&self) -> &str;

    /// Embed passages for storage. Returns one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder backed by the Gemini `batchEmbedContents` endpoint.
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    batch_size: usize,
}

impl GeminiEmbedder {
    pub fn new(client: GeminiClient, config: &ProviderConfig) -> Self {
        Self {
            client,
            model: model_resource(&config.embedding_model),
            batch_size: config.batch_size.max(1),
        }
    }

    async fn embed_batch(&self, texts: &[String], task_type: &str) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": self.model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": task_type,
                })
            })
            .collect();
        let body = json!({ "requests": requests });

        let reply = self
            .client
            .post(&self.model, "batchEmbedContents", &body)
            .await?;
        let vectors = parse_embeddings(&reply)?;
        if vectors.len() != texts.len() {
            return Err(RagError::Provider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            out.extend(self.embed_batch(batch, "RETRIEVAL_DOCUMENT").await?);
        }
        Ok(out)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()], "RETRIEVAL_QUERY")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Provider("empty embedding response".into()))
    }
}

/// Extract `embeddings[].values` from a `batchEmbedContents` reply.
fn parse_embeddings(json: &Value) -> Result<Vec<Vec<f32>>> {
    let items = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RagError::Provider("invalid response: missing embeddings array".into()))?;

    items
        .iter()
        .map(|item| {
            let values = item
                .get("values")
                .and_then(|v| v.as_array())
                .ok_or_else(|| RagError::Provider("invalid response: missing values".into()))?;
            Ok(values
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a zero
/// vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
