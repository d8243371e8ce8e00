//! Table document storage for backchain.
//!
//! This module provides persistence for decision-table documents,
//! supporting file-based and in-memory backends.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileTableStore;
pub use memory::MemoryTableStore;
pub use traits::TableStore;
