//! Atomic materialization of a single entity.
//!
//! Downloads stream into a fixed scratch file (`download.tmp` — downloads
//! run sequentially, so one scratch slot suffices) and become visible via
//! `rename`. A crash or failure mid-stream therefore never leaves a
//! truncated file at the final path. The checksum sidecar is written after
//! the primary artifact, non-atomically: losing the sidecar only makes the
//! artifact unverifiable until the next cycle re-fetches it.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::entity::CacheEntity;
use crate::metrics::CacheMetrics;

use super::{sidecar_path, SyncError};

/// Download one entity into the cache root.
pub(crate) fn download_entity(
    ctx: &crate::entity::TransferContext,
    root: &Path,
    tmp_dir: &Path,
    entity: &dyn CacheEntity,
    metrics: &CacheMetrics,
) -> Result<(), SyncError> {
    fs::create_dir_all(tmp_dir).map_err(|e| SyncError::CreateDirFailed {
        path: tmp_dir.to_path_buf(),
        source: e,
    })?;

    let tmp_path = tmp_dir.join("download.tmp");
    let target = root.join(entity.sub_path());

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let file = File::create(&tmp_path).map_err(|e| SyncError::WriteFailed {
        path: tmp_path.clone(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);

    info!(
        entity = %entity.name(),
        path = %target.display(),
        "downloading artifact"
    );

    let written = match entity.download(ctx, &mut writer) {
        Ok(written) => written,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(&tmp_path);
            return Err(SyncError::Download {
                sub_path: entity.sub_path().to_string(),
                source: e,
            });
        }
    };

    if let Err(e) = writer.flush() {
        let _ = fs::remove_file(&tmp_path);
        return Err(SyncError::WriteFailed {
            path: tmp_path.clone(),
            source: e,
        });
    }
    drop(writer);

    // A stale sidecar must not outlive the artifact it described.
    let sidecar = sidecar_path(&target);
    let _ = fs::remove_file(&sidecar);

    if let Err(e) = fs::rename(&tmp_path, &target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(SyncError::RenameFailed {
            from: tmp_path,
            to: target,
            source: e,
        });
    }

    metrics.add_downloaded_bytes(written);
    metrics.file_downloaded();

    if entity.has_checksum() {
        let file = File::create(&sidecar).map_err(|e| SyncError::WriteFailed {
            path: sidecar.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);

        entity
            .save_checksum(ctx, &mut writer)
            .map_err(|e| SyncError::Sidecar {
                sub_path: entity.sub_path().to_string(),
                source: e,
            })?;

        writer.flush().map_err(|e| SyncError::WriteFailed {
            path: sidecar.clone(),
            source: e,
        })?;
    }

    Ok(())
}
