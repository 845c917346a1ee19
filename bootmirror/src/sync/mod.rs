//! Cache reconciliation: diffing desired state against disk and
//! materializing the difference.
//!
//! One [`Syncer`] exists per artifact kind and owns that kind's cache
//! root. A sync pass walks the root into an index of [`LocalFile`]
//! records, computes `{remove, keep, add}` against the desired set (see
//! [`diff`]), deletes the orphans, downloads the additions through a
//! scratch file with an atomic rename, and finally prunes directories the
//! removals emptied.
//!
//! Failure semantics per cycle: removals are best-effort (logged, retried
//! next cycle), a failed download aborts the remainder of the kind's add
//! batch, and concurrent readers only ever observe complete files because
//! artifacts become visible through `rename`.

mod checksum;
mod diff;
mod download;
mod index;
mod plan;
mod prune;
#[cfg(test)]
pub(crate) mod testutil;

pub use checksum::file_md5;
pub use index::current_file_index;
pub use plan::{human_size, PlanAction, PlanEntry, SyncPlan};
pub use prune::clean_empty_dirs;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::entity::{CacheEntities, CacheEntity, EntityError, TransferContext};
use crate::metrics::CacheMetrics;

/// Errors raised while reconciling a cache root.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read {}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create directory {}", .path.display())]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to move {} into place at {}", .from.display(), .to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error while walking cache root {}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("download of {sub_path} failed")]
    Download {
        sub_path: String,
        #[source]
        source: EntityError,
    },

    #[error("checksum sidecar download of {sub_path} failed")]
    Sidecar {
        sub_path: String,
        #[source]
        source: EntityError,
    },

    #[error("failed to prune directory {}", .path.display())]
    Prune {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The path of an entity's checksum sidecar (`<path>.md5`).
pub(crate) fn sidecar_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(".md5");
    PathBuf::from(raw)
}

/// Reconciles one artifact kind's cache root.
pub struct Syncer {
    root_path: PathBuf,
    tmp_path: PathBuf,
    ctx: TransferContext,
    dry_run: bool,
    metrics: Arc<CacheMetrics>,
}

impl Syncer {
    /// Create a syncer for `root_path`, downloading through `tmp_path`.
    ///
    /// The root directory is created if missing so a fresh cache starts
    /// from an empty index instead of a walk error.
    pub fn new(
        root_path: PathBuf,
        tmp_path: PathBuf,
        ctx: TransferContext,
        dry_run: bool,
        metrics: Arc<CacheMetrics>,
    ) -> Result<Self, SyncError> {
        fs::create_dir_all(&root_path).map_err(|e| SyncError::CreateDirFailed {
            path: root_path.clone(),
            source: e,
        })?;

        Ok(Self {
            root_path,
            tmp_path,
            ctx,
            dry_run,
            metrics,
        })
    }

    /// Reconcile the cache root against `desired`.
    pub fn sync(&self, desired: CacheEntities) -> Result<SyncPlan, SyncError> {
        let current = current_file_index(&self.root_path)?;
        let (remove, keep, add) = diff::define_diff(&self.ctx, &self.root_path, current, desired)?;

        let plan = SyncPlan::build(&remove, &keep, &add);
        info!(
            remove = remove.len(),
            keep = keep.len(),
            add = add.len(),
            cache_size_after = %human_size(plan.cache_size_after),
            "computed sync plan"
        );
        debug!("sync plan:\n{plan}");

        if self.dry_run {
            info!("dry run: not downloading or deleting artifacts\n{plan}");
            return Ok(plan);
        }

        for entity in &remove {
            self.remove_entity(entity.as_ref());
        }

        for entity in &add {
            download::download_entity(
                &self.ctx,
                &self.root_path,
                &self.tmp_path,
                entity.as_ref(),
                &self.metrics,
            )?;
        }

        clean_empty_dirs(&self.root_path)?;

        Ok(plan)
    }

    /// Delete an entity and its sidecar from disk, best-effort.
    fn remove_entity(&self, entity: &dyn CacheEntity) {
        let path = self.root_path.join(entity.sub_path());
        info!(path = %path.display(), "removing artifact from cache");

        if let Err(e) = fs::remove_file(&path) {
            error!(path = %path.display(), error = %e, "error deleting cached artifact");
        }

        let sidecar = sidecar_path(&path);
        if sidecar.exists() {
            if let Err(e) = fs::remove_file(&sidecar) {
                error!(path = %sidecar.display(), error = %e, "error deleting checksum sidecar");
            }
        }
    }
}
