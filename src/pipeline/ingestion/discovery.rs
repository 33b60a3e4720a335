use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::common::error::{Result, ScoringError};

/// Recursively lists regular files under `root` whose extension matches
/// `extension` (case-insensitive), sorted by path.
pub fn discover_documents(root: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ScoringError::config(format!(
            "documents directory does not exist: {}",
            root.display()
        )));
    }

    let wanted = extension.trim_start_matches('.');
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, wanted))
        .collect();

    paths.sort();
    info!(root = %root.display(), count = paths.len(), "Discovered documents");
    Ok(paths)
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}
