//! Filesystem checks used before a job starts.
//!
//! This module provides low-level operations for:
//! - Counting eligible input files
//! - Creating the output directory
//! - Checking that the worker binary can be executed

use std::fs;
use std::io;
use std::path::Path;
use crate::error::EngineError;

/// Count files in `dir` (non-recursive) whose name ends with `.{extension}`,
/// compared case-insensitively.
///
/// # Errors
/// Returns the underlying io::Error if the directory cannot be listed.
pub fn count_eligible_files(dir: &Path, extension: &str) -> io::Result<u64> {
    let suffix = format!(".{}", extension.to_lowercase());
    let mut count = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy().to_lowercase();
        if name.ends_with(&suffix) {
            count += 1;
        }
    }

    Ok(count)
}

/// Create `path` and any missing parents; an existing directory is used as-is.
///
/// # Errors
/// Returns EngineError::OutputDirCreation with the OS reason on failure.
pub fn ensure_dir_exists(path: &Path) -> Result<(), EngineError> {
    fs::create_dir_all(path).map_err(|e| EngineError::OutputDirCreation {
        path: path.to_path_buf(),
        source: e,
    })
}

/// True if `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use nix::unistd::{access, AccessFlags};
        access(path, AccessFlags::X_OK).is_ok()
    }

    #[cfg(not(unix))]
    {
        true
    }
}
