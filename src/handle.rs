//! Swappable reference to the active vector index.
//!
//! Chat requests take a snapshot at start and keep using it even if an
//! indexing run installs a new index meanwhile. Before the first install
//! every snapshot fails with [`RagError::NotReady`].

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{RagError, Result};
use crate::index::VectorIndex;

#[derive(Clone, Default)]
pub struct IndexHandle {
    inner: Arc<RwLock<Option<Arc<VectorIndex>>>>,
}

impl IndexHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_index(index: Arc<VectorIndex>) -> Self {
        let handle = Self::default();
        handle.install(index);
        handle
    }

    /// The current index, or `NotReady`.
    pub fn snapshot(&self) -> Result<Arc<VectorIndex>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RagError::NotReady)
    }

    /// The current index, if any, without the error.
    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `index` current and return the previous one.
    pub fn install(&self, index: Arc<VectorIndex>) -> Option<Arc<VectorIndex>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(index)
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }
}
