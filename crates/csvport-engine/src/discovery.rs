//! Source file discovery.
//!
//! Recursively enumerates `.csv` files (case-insensitive) under a root
//! folder. A missing root is a fatal error surfaced before any job is
//! created; individual unreadable directory entries are logged and
//! skipped so one bad subtree does not abort discovery.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{EngineError, Result};

/// Enumerate all `.csv` files under `root`, depth-first.
pub fn discover_csv_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(EngineError::RootFolderMissing(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let is_csv = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);

        if is_csv {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}
