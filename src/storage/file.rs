//! File-based table storage.
//!
//! Documents are stored as pretty-printed JSON. Atomic writes are achieved
//! via temp file + rename pattern.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ChainError, Result};
use crate::storage::TableStore;
use crate::table::TableDocument;
use crate::util::{read_to_string_with_limit, MAX_FILE_SIZE};

/// File-based table storage.
#[derive(Debug, Clone)]
pub struct FileTableStore {
    /// Path of the document file.
    path: PathBuf,
    /// Largest document that will be read.
    max_bytes: u64,
}

impl FileTableStore {
    /// Create a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: MAX_FILE_SIZE,
        }
    }

    /// Set the largest document size that will be read.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Path of the document file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path for a temp file used during atomic writes.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    /// Write the document atomically using temp file + rename.
    fn atomic_write(&self, document: &TableDocument) -> Result<()> {
        let temp_path = self.temp_path();
        let json = document.to_json_pretty()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ChainError::storage(parent, e))?;
        }

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| ChainError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| ChainError::storage(&temp_path, e))?;
            file.write_all(b"\n")
                .map_err(|e| ChainError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| ChainError::storage(&temp_path, e))?;
        }

        // Rename temp file to final path (atomic on POSIX)
        fs::rename(&temp_path, &self.path).map_err(|e| ChainError::storage(&self.path, e))?;

        Ok(())
    }
}

impl TableStore for FileTableStore {
    fn load(&self) -> Result<TableDocument> {
        let content = read_to_string_with_limit(&self.path, self.max_bytes)?;
        TableDocument::from_json(&content).map_err(|e| {
            ChainError::table(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, document: &TableDocument) -> Result<()> {
        self.atomic_write(document)?;
        tracing::debug!(path = %self.path.display(), "saved table document");
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::tests::{sample_document, test_table_store_round_trip};
    use tempfile::TempDir;

    fn create_test_store() -> (FileTableStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FileTableStore::new(dir.path().join("table.json"));
        (store, dir)
    }

    #[test]
    fn test_file_store_round_trip() {
        let (store, _dir) = create_test_store();
        test_table_store_round_trip(&store);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = FileTableStore::new(dir.path().join("nested").join("out.json"));
        store.save(&sample_document()).unwrap();
        assert!(dir.path().join("nested").join("out.json").is_file());
    }

    #[test]
    fn test_temp_file_cleaned_up() {
        let (store, _dir) = create_test_store();
        store.save(&sample_document()).unwrap();
        assert!(!store.temp_path().exists());
        assert!(store.temp_path().ends_with(".table.json.tmp"));
    }

    #[test]
    fn test_atomic_write_creates_valid_json() {
        let (store, _dir) = create_test_store();
        store.save(&sample_document()).unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["tables"][0]["id"], "y");
    }

    #[test]
    fn test_load_invalid_json_is_table_error() {
        let (store, _dir) = create_test_store();
        fs::write(store.path(), "not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, ChainError::Table { .. }));
        assert!(err.to_string().contains("table.json"));
    }

    #[test]
    fn test_load_respects_size_limit() {
        let (store, _dir) = create_test_store();
        store.save(&sample_document()).unwrap();

        let store = store.with_max_bytes(10);
        assert!(store.load().unwrap_err().to_string().contains("too large"));
    }
}
