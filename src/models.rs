//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, retrieved results and
//! conversation turns that flow between the loader, chunker, vector index,
//! memory and generator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Provenance and loader-specific fields attached to a document.
///
/// `source` is always the identifier the caller supplied (URL or path).
/// Chunks inherit a copy of their parent's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// Loader that produced the document (`web`, `pdf`, `markdown`, ...).
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl DocumentMetadata {
    pub fn new(source: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            page: None,
            title: None,
        }
    }
}

/// Raw text produced by a loader.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// A token-bounded slice of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Position of this chunk within its parent document.
    pub chunk_index: i64,
    pub content: String,
    pub metadata: DocumentMetadata,
    /// SHA-256 of `content`, used for deduplication.
    pub hash: String,
}

/// A chunk returned from the vector index, with its query similarity.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub score: f32,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Role::Human),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Composite key scoping a conversation: `(user_id, session_id)`.
///
/// Stored as `"{user_id}_{session_id}"` so equal session ids from different
/// users never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Key for a brand new session with a generated id.
    pub fn generate(user_id: impl Into<String>) -> Self {
        Self::new(user_id, uuid::Uuid::new_v4().to_string())
    }

    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.user_id, self.session_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Result of one chat request.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub answer: String,
    pub sources: BTreeSet<String>,
    /// The query actually sent to retrieval.
    pub standalone_query: String,
}
