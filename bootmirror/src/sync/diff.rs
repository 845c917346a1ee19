//! The cache diff engine.
//!
//! Matching between the desired set and the on-disk index is by `sub_path`
//! equality only; sizes and timestamps are never compared. For desired
//! entities that are already on disk and carry a checksum sidecar, the
//! remote checksum decides between `keep` and re-`add`. When the remote
//! checksum cannot be fetched the entity is skipped for the whole cycle —
//! neither kept nor re-downloaded — so a transient origin error does not
//! trigger a needless multi-gigabyte download.

use std::collections::HashSet;
use std::path::Path;

use tracing::{error, info};

use crate::entity::{CacheEntities, TransferContext};

use super::checksum::file_md5;
use super::SyncError;

/// Compute `{remove, keep, add}` between the on-disk index and the
/// desired set.
pub(crate) fn define_diff(
    ctx: &TransferContext,
    root: &Path,
    current: CacheEntities,
    desired: CacheEntities,
) -> Result<(CacheEntities, CacheEntities, CacheEntities), SyncError> {
    let desired_paths: HashSet<String> = desired
        .iter()
        .map(|e| e.sub_path().to_string())
        .collect();
    let current_paths: HashSet<String> = current
        .iter()
        .map(|e| e.sub_path().to_string())
        .collect();

    let mut remove = CacheEntities::new();
    let mut keep = CacheEntities::new();
    let mut add = CacheEntities::new();

    for want in desired {
        if !current_paths.contains(want.sub_path()) {
            add.push(want);
            continue;
        }

        // Checksum-less kinds cannot be verified; an existing file is
        // trusted as long as it stays referenced.
        if !want.has_checksum() {
            keep.push(want);
            continue;
        }

        let expected = match want.fetch_checksum(ctx) {
            Ok(checksum) => checksum,
            Err(e) => {
                error!(
                    path = want.sub_path(),
                    error = %e,
                    "error fetching remote checksum, skipping artifact for this cycle"
                );
                continue;
            }
        };

        let actual = file_md5(&root.join(want.sub_path()))?;

        if actual == expected {
            keep.push(want);
        } else {
            info!(
                path = want.sub_path(),
                "cached artifact has invalid checksum, scheduling new download"
            );
            add.push(want);
        }
    }

    for existing in current {
        if !desired_paths.contains(existing.sub_path()) {
            remove.push(existing);
        }
    }

    Ok((remove, keep, add))
}
