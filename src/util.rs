//! Utility functions for backchain.

use std::fs;
use std::path::Path;

use crate::error::{ChainError, Result};

/// Maximum size of a table document or config file read into memory (10 MB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

/// Read a file into a string with a size limit.
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be read (doesn't exist, permission denied, etc.)
/// * The file exceeds `max_size`
pub fn read_to_string_with_limit(path: &Path, max_size: u64) -> Result<String> {
    let metadata = fs::metadata(path).map_err(|e| ChainError::storage(path, e))?;

    let size = metadata.len();
    if size > max_size {
        return Err(ChainError::table(format!(
            "file {} is too large ({} bytes, max {} bytes)",
            path.display(),
            size,
            max_size
        )));
    }

    fs::read_to_string(path).map_err(|e| ChainError::storage(path, e))
}

/// Read a file into a string, limited to [`MAX_FILE_SIZE`].
pub fn read_to_string_limited(path: &Path) -> Result<String> {
    read_to_string_with_limit(path, MAX_FILE_SIZE)
}
