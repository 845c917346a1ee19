//! Bottom-up pruning of directories emptied by eviction.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::SyncError;

/// Recursively delete every empty directory below `root`.
///
/// The walk is depth-first so a chain of directories that only contained
/// each other collapses in one pass. The root itself is never removed.
pub fn clean_empty_dirs(root: &Path) -> Result<(), SyncError> {
    prune_dir(root)?;
    Ok(())
}

/// Prune inside `dir`; returns whether `dir` ended up empty.
fn prune_dir(dir: &Path) -> Result<bool, SyncError> {
    let prune_err = |e: std::io::Error| SyncError::Prune {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut empty = true;

    for entry in fs::read_dir(dir).map_err(prune_err)? {
        let entry = entry.map_err(prune_err)?;
        let path = entry.path();

        if entry.file_type().map_err(prune_err)?.is_dir() {
            if prune_dir(&path)? {
                debug!(path = %path.display(), "removing empty cache directory");
                fs::remove_dir(&path).map_err(|e| SyncError::Prune {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                empty = false;
            }
        } else {
            empty = false;
        }
    }

    Ok(empty)
}
