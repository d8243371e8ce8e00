//! In-memory table storage.
//!
//! This module provides a thread-safe in-memory implementation of the
//! TableStore trait, used by tests and by callers that keep documents
//! outside the filesystem.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{ChainError, Result};
use crate::storage::TableStore;
use crate::table::TableDocument;

/// In-memory table store.
///
/// Thread-safe implementation using `RwLock<Option<TableDocument>>`.
/// The document is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryTableStore {
    document: RwLock<Option<TableDocument>>,
    saves: AtomicUsize,
}

impl MemoryTableStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `document`.
    pub fn with_document(document: TableDocument) -> Self {
        Self {
            document: RwLock::new(Some(document)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times `save` has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The stored document, if any.
    pub fn snapshot(&self) -> Option<TableDocument> {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TableStore for MemoryTableStore {
    fn load(&self) -> Result<TableDocument> {
        self.snapshot()
            .ok_or_else(|| ChainError::table("no document in memory store"))
    }

    fn save(&self, document: &TableDocument) -> Result<()> {
        let mut slot = self
            .document
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self
            .document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
