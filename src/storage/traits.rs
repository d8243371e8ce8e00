//! Table storage traits for backchain.
//!
//! This module defines the `TableStore` trait for document persistence.

use std::sync::Arc;

use crate::error::Result;
use crate::table::TableDocument;

/// Trait for table document storage backends.
///
/// A store holds a single document. Handlers load their initial rules from
/// one store and may write updated documents to another.
pub trait TableStore: Send + Sync {
    /// Load the document.
    ///
    /// Fails if the document does not exist or cannot be parsed.
    fn load(&self) -> Result<TableDocument>;

    /// Save the document, replacing any previous version.
    fn save(&self, document: &TableDocument) -> Result<()>;

    /// Check if a document has been stored.
    fn exists(&self) -> Result<bool>;

    /// Human-readable location, for logs and messages.
    fn describe(&self) -> String;
}

/// Blanket implementation of TableStore for Arc-wrapped stores.
///
/// This allows sharing one store between a handler and the code inspecting
/// what it wrote.
impl<T: TableStore + ?Sized> TableStore for Arc<T> {
    fn load(&self) -> Result<TableDocument> {
        (**self).load()
    }

    fn save(&self, document: &TableDocument) -> Result<()> {
        (**self).save(document)
    }

    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
