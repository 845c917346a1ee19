//! On-disk index of a cache root.

use std::fs;
use std::path::Path;

use crate::entity::{CacheEntities, LocalFile};

use super::SyncError;

/// Walk `root` and record every non-sidecar file as a [`LocalFile`].
///
/// Entries are visited in lexical order so the index (and everything
/// derived from it) is deterministic. Checksum sidecars are skipped; they
/// are owned by their primary artifact.
pub fn current_file_index(root: &Path) -> Result<CacheEntities, SyncError> {
    let mut result = CacheEntities::new();
    walk(root, root, &mut result)?;
    Ok(result)
}

fn walk(root: &Path, dir: &Path, out: &mut CacheEntities) -> Result<(), SyncError> {
    let walk_err = |e: std::io::Error| SyncError::Walk {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)
        .map_err(walk_err)?
        .collect::<Result<_, _>>()
        .map_err(walk_err)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata().map_err(walk_err)?;

        if metadata.is_dir() {
            walk(root, &path, out)?;
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".md5") {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        out.push(Box::new(LocalFile {
            name,
            sub_path: relative.to_string_lossy().to_string(),
            size: metadata.len(),
        }));
    }

    Ok(())
}
