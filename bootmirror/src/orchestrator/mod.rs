//! The sync orchestrator.
//!
//! Runs the three artifact kinds — OS images, kernels, boot images —
//! through the same select→diff→materialize pipeline once per cycle.
//! Kinds run sequentially and independently: a failure in one is
//! collected and reported but never blocks the others. The orchestrator
//! owns the at-most-one-concurrent-cycle guard; the scheduler in
//! [`daemon`] consults it on every trigger and skips (never queues) when
//! a cycle is still in flight.

mod daemon;

pub use daemon::SyncDaemon;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::HttpCatalog;
use crate::config::{Config, ConfigError};
use crate::entity::{CacheEntities, CacheEntity, TransferContext};
use crate::metrics::MetricsRegistry;
use crate::selection::{CandidateSelector, HttpProber, SelectionError};
use crate::store::{HttpObjectStore, ObjectStore};
use crate::sync::{human_size, SyncError, Syncer};

/// The three artifact kinds a cycle covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Images,
    Kernels,
    BootImages,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Images => write!(f, "images"),
            ArtifactKind::Kernels => write!(f, "kernels"),
            ArtifactKind::BootImages => write!(f, "boot images"),
        }
    }
}

/// A failure within one kind's pipeline.
#[derive(Debug, Error)]
pub enum KindError {
    #[error("cannot determine sync candidates: {0}")]
    Selection(#[from] SelectionError),

    #[error("cannot sync cache root: {0}")]
    Sync(#[from] SyncError),
}

/// One kind's failure, attributed.
#[derive(Debug, Error)]
#[error("{kind} sync failed: {source}")]
pub struct CycleKindError {
    pub kind: ArtifactKind,
    #[source]
    pub source: KindError,
}

/// All failures of one cycle, collected across kinds.
#[derive(Debug)]
pub struct CycleError {
    pub errors: Vec<CycleKindError>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors occurred during sync cycle: ")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CycleError {}

/// Errors raised while building the orchestrator from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Drives full sync cycles across all artifact kinds.
pub struct SyncOrchestrator {
    selector: CandidateSelector,
    image_syncer: Syncer,
    kernel_syncer: Option<Syncer>,
    boot_image_syncer: Option<Syncer>,
    running: AtomicBool,
}

impl SyncOrchestrator {
    /// Assemble an orchestrator from pre-built components.
    ///
    /// `kernel_syncer`/`boot_image_syncer` are `None` when the respective
    /// cache kind is disabled.
    pub fn new(
        selector: CandidateSelector,
        image_syncer: Syncer,
        kernel_syncer: Option<Syncer>,
        boot_image_syncer: Option<Syncer>,
    ) -> Self {
        Self {
            selector,
            image_syncer,
            kernel_syncer,
            boot_image_syncer,
            running: AtomicBool::new(false),
        }
    }

    /// Wire up the production orchestrator: HTTP catalog, HTTP object
    /// store, HEAD prober, one syncer per enabled kind.
    pub fn from_config(
        config: &Config,
        metrics: &MetricsRegistry,
        cancel: CancellationToken,
    ) -> Result<Self, BuildError> {
        let policy = config.selection_policy()?;

        let store: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
            config.store_endpoint.as_str(),
            config.store_bucket.as_str(),
            cancel.clone(),
        ));

        let selector = CandidateSelector::new(
            Arc::new(HttpCatalog::new(config.catalog_endpoint.as_str(), cancel.clone())),
            Arc::clone(&store),
            Arc::new(HttpProber::new(cancel.clone())),
            policy,
            Arc::clone(&metrics.images),
        );

        let ctx = TransferContext::new(store, cancel);

        let image_syncer = Syncer::new(
            config.image_root_path(),
            config.tmp_download_path(),
            ctx.clone(),
            config.dry_run,
            Arc::clone(&metrics.images),
        )?;

        let kernel_syncer = if config.kernel_cache_enabled {
            Some(Syncer::new(
                config.kernel_root_path(),
                config.tmp_download_path(),
                ctx.clone(),
                config.dry_run,
                Arc::clone(&metrics.kernels),
            )?)
        } else {
            None
        };

        let boot_image_syncer = if config.boot_image_cache_enabled {
            Some(Syncer::new(
                config.boot_image_root_path(),
                config.tmp_download_path(),
                ctx,
                config.dry_run,
                Arc::clone(&metrics.boot_images),
            )?)
        } else {
            None
        };

        Ok(Self::new(
            selector,
            image_syncer,
            kernel_syncer,
            boot_image_syncer,
        ))
    }

    /// Run one full cycle, collecting per-kind errors.
    pub fn run_cycle(&self) -> Result<(), CycleError> {
        let mut errors = Vec::new();

        if let Err(source) = self.sync_images() {
            errors.push(CycleKindError {
                kind: ArtifactKind::Images,
                source,
            });
        }

        if let Err(source) = self.sync_kernels() {
            errors.push(CycleKindError {
                kind: ArtifactKind::Kernels,
                source,
            });
        }

        if let Err(source) = self.sync_boot_images() {
            errors.push(CycleKindError {
                kind: ArtifactKind::BootImages,
                source,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CycleError { errors })
        }
    }

    /// Run one cycle unless another is already in flight.
    ///
    /// Returns `None` when the trigger was skipped. The in-flight flag is
    /// released even if the cycle panics.
    pub fn run_cycle_guarded(&self) -> Option<Result<(), CycleError>> {
        struct Guard<'a>(&'a AtomicBool);

        impl Drop for Guard<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let _guard = Guard(&self.running);
        Some(self.run_cycle())
    }

    fn sync_images(&self) -> Result<(), KindError> {
        let (images, size) = self.selector.determine_images()?;
        info!(
            amount = images.len(),
            size = %human_size(size),
            "determined image sync candidates"
        );

        let entities: CacheEntities = images
            .into_iter()
            .map(|image| Box::new(image) as Box<dyn CacheEntity>)
            .collect();
        self.image_syncer.sync(entities)?;

        Ok(())
    }

    fn sync_kernels(&self) -> Result<(), KindError> {
        let Some(syncer) = &self.kernel_syncer else {
            return Ok(());
        };

        let kernels = self.selector.determine_kernels()?;
        info!(amount = kernels.len(), "determined kernel sync candidates");

        let entities: CacheEntities = kernels
            .into_iter()
            .map(|kernel| Box::new(kernel) as Box<dyn CacheEntity>)
            .collect();
        syncer.sync(entities)?;

        Ok(())
    }

    fn sync_boot_images(&self) -> Result<(), KindError> {
        let Some(syncer) = &self.boot_image_syncer else {
            return Ok(());
        };

        let boot_images = self.selector.determine_boot_images()?;
        info!(
            amount = boot_images.len(),
            "determined boot image sync candidates"
        );

        let entities: CacheEntities = boot_images
            .into_iter()
            .map(|boot_image| Box::new(boot_image) as Box<dyn CacheEntity>)
            .collect();
        syncer.sync(entities)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::Write as _;
    use std::path::Path;

    use tempfile::TempDir;

    use crate::catalog::{Catalog, CatalogError, CatalogImage, Partition};
    use crate::metrics::CacheMetrics;
    use crate::selection::{ProbeError, SelectionPolicy, SizeProber};
    use crate::store::{ObjectMeta, StoreError};

    struct EmptyCatalog;

    impl Catalog for EmptyCatalog {
        fn list_images(&self) -> Result<Vec<CatalogImage>, CatalogError> {
            Ok(vec![])
        }

        fn list_partitions(&self) -> Result<Vec<Partition>, CatalogError> {
            Ok(vec![])
        }
    }

    struct EmptyStore;

    impl ObjectStore for EmptyStore {
        fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError> {
            Ok(vec![])
        }

        fn get_object(
            &self,
            key: &str,
            _target: &mut dyn std::io::Write,
        ) -> Result<u64, StoreError> {
            Err(StoreError::NotFound {
                key: key.to_string(),
            })
        }
    }

    struct BrokenStore;

    impl ObjectStore for BrokenStore {
        fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError> {
            Err(StoreError::Request {
                url: "http://store".to_string(),
                reason: "unreachable".to_string(),
            })
        }

        fn get_object(
            &self,
            key: &str,
            _target: &mut dyn std::io::Write,
        ) -> Result<u64, StoreError> {
            Err(StoreError::NotFound {
                key: key.to_string(),
            })
        }
    }

    struct NoProbe;

    impl SizeProber for NoProbe {
        fn content_length(&self, url: &str) -> Result<u64, ProbeError> {
            Err(ProbeError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            min_per_name: 1,
            max_per_name: None,
            max_cache_size: u64::MAX,
            exclude_substrings: vec![],
            expiration_grace_days: 0,
        }
    }

    fn write_file(root: &Path, sub_path: &str) {
        let path = root.join(sub_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"stale").unwrap();
    }

    fn orchestrator(temp: &TempDir, store: Arc<dyn ObjectStore>) -> SyncOrchestrator {
        let ctx = TransferContext::new(
            Arc::clone(&store),
            tokio_util::sync::CancellationToken::new(),
        );
        let tmp_path = temp.path().join("tmp");

        let selector = CandidateSelector::new(
            Arc::new(EmptyCatalog),
            store,
            Arc::new(NoProbe),
            policy(),
            Arc::new(CacheMetrics::new()),
        );

        let image_syncer = Syncer::new(
            temp.path().join("images"),
            tmp_path.clone(),
            ctx.clone(),
            false,
            Arc::new(CacheMetrics::new()),
        )
        .unwrap();
        let kernel_syncer = Syncer::new(
            temp.path().join("kernels"),
            tmp_path.clone(),
            ctx.clone(),
            false,
            Arc::new(CacheMetrics::new()),
        )
        .unwrap();
        let boot_image_syncer = Syncer::new(
            temp.path().join("boot-images"),
            tmp_path,
            ctx,
            false,
            Arc::new(CacheMetrics::new()),
        )
        .unwrap();

        SyncOrchestrator::new(
            selector,
            image_syncer,
            Some(kernel_syncer),
            Some(boot_image_syncer),
        )
    }

    #[test]
    fn test_cycle_with_empty_catalog_succeeds() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp, Arc::new(EmptyStore));

        orchestrator.run_cycle().unwrap();
    }

    #[test]
    fn test_failing_kind_does_not_block_others() {
        let temp = TempDir::new().unwrap();
        // a stale kernel that the kernel cycle should clean up
        write_file(&temp.path().join("kernels"), "old/vmlinuz");

        let orchestrator = orchestrator(&temp, Arc::new(BrokenStore));

        let err = orchestrator.run_cycle().unwrap_err();

        // only the image kind failed
        assert_eq!(err.errors.len(), 1);
        assert_eq!(err.errors[0].kind, ArtifactKind::Images);
        assert!(matches!(err.errors[0].source, KindError::Selection(_)));

        // the kernel cycle still ran and removed the orphan
        assert!(!temp.path().join("kernels/old/vmlinuz").exists());
    }

    #[test]
    fn test_disabled_kinds_are_skipped() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(EmptyStore);
        let ctx = TransferContext::new(
            Arc::clone(&store),
            tokio_util::sync::CancellationToken::new(),
        );

        let selector = CandidateSelector::new(
            Arc::new(EmptyCatalog),
            store,
            Arc::new(NoProbe),
            policy(),
            Arc::new(CacheMetrics::new()),
        );
        let image_syncer = Syncer::new(
            temp.path().join("images"),
            temp.path().join("tmp"),
            ctx,
            false,
            Arc::new(CacheMetrics::new()),
        )
        .unwrap();

        let orchestrator = SyncOrchestrator::new(selector, image_syncer, None, None);
        orchestrator.run_cycle().unwrap();

        assert!(!temp.path().join("kernels").exists());
        assert!(!temp.path().join("boot-images").exists());
    }

    #[test]
    fn test_guarded_cycle_skips_when_running() {
        let temp = TempDir::new().unwrap();
        let orchestrator = orchestrator(&temp, Arc::new(EmptyStore));

        orchestrator.running.store(true, Ordering::SeqCst);
        assert!(orchestrator.run_cycle_guarded().is_none());

        orchestrator.running.store(false, Ordering::SeqCst);
        assert!(orchestrator.run_cycle_guarded().is_some());
        // the guard released the flag
        assert!(!orchestrator.running.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cycle_error_display_lists_kinds() {
        let error = CycleError {
            errors: vec![CycleKindError {
                kind: ArtifactKind::Images,
                source: KindError::Selection(SelectionError::Store(StoreError::Request {
                    url: "http://store".to_string(),
                    reason: "unreachable".to_string(),
                })),
            }],
        };

        let rendered = error.to_string();
        assert!(rendered.contains("images sync failed"));
        assert!(rendered.contains("unreachable"));
    }
}
