//! Error taxonomy for the retrieval pipeline.
//!
//! Core components (loader, chunker, index, reformulator, generator, memory)
//! return [`RagError`]. Callers map errors to their own status codes through
//! [`RagError::kind`], which groups variants into the categories the serving
//! layer cares about: the caller's fault, "not ready yet", transient runtime
//! failures, and everything unexpected.
//!
//! Plumbing code (config loading, migrations, the CLI) keeps using
//! `anyhow::Result`; an `anyhow::Error` crossing into the core becomes
//! [`RagError::Other`].

use std::time::Duration;

use thiserror::Error;

/// Convenience alias used throughout the core modules.
pub type Result<T, E = RagError> = std::result::Result<T, E>;

/// Errors produced by the ingestion and chat pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad caller input: empty source list, empty query, invalid parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A source identifier with an extension no loader handles.
    #[error("unsupported file type: {0}")]
    UnsupportedSource(String),

    /// Every source in an indexing batch failed to load.
    #[error("no documents were successfully loaded")]
    NoDocumentsLoaded,

    /// The vector index has not been initialised yet.
    #[error("retriever has not been initialised")]
    NotReady,

    /// Text extraction failed for a single document.
    #[error("extraction failed for {source_id}: {message}")]
    Extract { source_id: String, message: String },

    /// Embedding or generation call failed (network, quota, auth, bad response).
    #[error("provider error: {0}")]
    Provider(String),

    /// A request exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error category used by callers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something unusable. Do not retry.
    BadInput,
    /// The index is not available yet.
    NotReady,
    /// A transient failure of this request (provider, extraction, timeout).
    Runtime,
    /// Storage or internal failures.
    Unexpected,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RagError::InvalidInput(_) | RagError::UnsupportedSource(_) => ErrorKind::BadInput,
            RagError::NotReady => ErrorKind::NotReady,
            RagError::NoDocumentsLoaded
            | RagError::Extract { .. }
            | RagError::Provider(_)
            | RagError::Timeout(_) => ErrorKind::Runtime,
            RagError::Database(_) | RagError::Io(_) | RagError::Other(_) => ErrorKind::Unexpected,
        }
    }

    pub(crate) fn extract(source_id: impl Into<String>, message: impl ToString) -> Self {
        RagError::Extract {
            source_id: source_id.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for RagError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RagError::Provider(format!("request timed out: {}", e))
        } else {
            RagError::Provider(e.to_string())
        }
    }
}
