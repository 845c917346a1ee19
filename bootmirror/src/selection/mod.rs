//! Candidate selection: deciding which artifact versions deserve caching.
//!
//! For OS images the selector cross-references the catalog against the
//! object store, filters exclusions and expired entries, then applies the
//! retention policy (see [`reduce`]). For kernels and boot images it walks
//! the partition boot configurations, deduplicates URLs, and probes the
//! origin for sizes; there is no retention cap beyond uniqueness for those
//! kinds.
//!
//! Per-entity problems (malformed identifier, missing sidecar, failed
//! probe) skip the entity with a log line; only an unreachable catalog or
//! store aborts a listing.

mod probe;
mod reduce;

pub use probe::{HttpProber, ProbeError, SizeProber};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::Url;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::entity::version::parse_os_and_version;
use crate::entity::{BootImage, Kernel, OsImage};
use crate::metrics::CacheMetrics;
use crate::store::{ObjectMeta, ObjectStore, StoreError};

/// Errors that abort an entire kind's listing.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("cannot list catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("cannot list object store: {0}")]
    Store(#[from] StoreError),
}

/// Retention policy for the image cache.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Minimum number of images to keep per eviction group; eviction never
    /// goes below this.
    pub min_per_name: usize,

    /// Maximum number of images per `(os, major.minor)` bucket; `None`
    /// means unlimited.
    pub max_per_name: Option<usize>,

    /// Target cache size in bytes.
    pub max_cache_size: u64,

    /// URL substrings that exclude an artifact from syncing.
    pub exclude_substrings: Vec<String>,

    /// Days to keep syncing an image past its expiration date.
    pub expiration_grace_days: u32,
}

/// Decides the desired working set per artifact kind.
pub struct CandidateSelector {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn ObjectStore>,
    prober: Arc<dyn SizeProber>,
    policy: SelectionPolicy,
    metrics: Arc<CacheMetrics>,
}

impl CandidateSelector {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn ObjectStore>,
        prober: Arc<dyn SizeProber>,
        policy: SelectionPolicy,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            catalog,
            store,
            prober,
            policy,
            metrics,
        }
    }

    /// Determine the OS images to keep locally and their aggregate size.
    pub fn determine_images(&self) -> Result<(Vec<OsImage>, u64), SelectionError> {
        let store_objects: HashMap<String, ObjectMeta> = self
            .store
            .list_objects()?
            .into_iter()
            .map(|o| (o.key.clone(), o))
            .collect();

        let catalog_images = self.catalog.list_images()?;
        self.metrics.set_catalog_count(catalog_images.len() as u64);

        let grace = Duration::days(i64::from(self.policy.expiration_grace_days));

        let mut eligible: Vec<OsImage> = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();

        for img in &catalog_images {
            if self.is_excluded(&img.url) {
                debug!(id = %img.id, "skipping image with excluded URL");
                continue;
            }

            if let Some(expiration) = img.expiration_date {
                if Utc::now().signed_duration_since(expiration) > grace {
                    debug!(id = %img.id, "not considering expired image, skipping");
                    continue;
                }
            }

            let (os_name, version) = match parse_os_and_version(&img.id) {
                Ok(parsed) => parsed,
                Err(e) => {
                    error!(id = %img.id, error = %e, "could not extract os and version, skipping");
                    continue;
                }
            };

            let key = match Url::parse(&img.url) {
                Ok(url) => url.path().trim_start_matches('/').to_string(),
                Err(e) => {
                    error!(id = %img.id, error = %e, "image url is invalid, skipping");
                    continue;
                }
            };

            let Some(artifact) = store_objects.get(&key) else {
                error!(id = %img.id, key = %key, "image is not contained in object store, skipping");
                continue;
            };

            let Some(checksum) = store_objects.get(&format!("{key}.md5")) else {
                error!(id = %img.id, key = %key, "image checksum is not contained in object store, skipping");
                continue;
            };

            if !seen_paths.insert(key.clone()) {
                debug!(id = %img.id, key = %key, "duplicate cache path, skipping");
                continue;
            }

            eligible.push(OsImage {
                os_name,
                version,
                id: img.id.clone(),
                expiration: img.expiration_date,
                artifact: artifact.clone(),
                checksum: checksum.clone(),
            });
        }

        let (selected, size_count) = reduce::select_within_budget(eligible, &self.policy);

        self.metrics
            .set_unsynced_count((catalog_images.len() - selected.len()) as u64);

        Ok((selected, size_count))
    }

    /// Determine the kernels referenced by partition boot configuration.
    pub fn determine_kernels(&self) -> Result<Vec<Kernel>, SelectionError> {
        let partitions = self.catalog.list_partitions()?;

        let mut result = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for partition in partitions {
            let Some(boot_config) = partition.boot_config else {
                continue;
            };
            let kernel_url = boot_config.kernel_url;

            if seen.contains(&kernel_url) {
                continue;
            }

            if self.is_excluded(&kernel_url) {
                debug!(url = %kernel_url, "skipping kernel with excluded URL");
                continue;
            }

            let parsed = match Url::parse(&kernel_url) {
                Ok(url) => url,
                Err(e) => {
                    error!(url = %kernel_url, error = %e, "kernel url is invalid, skipping");
                    continue;
                }
            };

            let size = match self.prober.content_length(&kernel_url) {
                Ok(size) => size,
                Err(e) => {
                    warn!(url = %kernel_url, error = %e, "unable to determine kernel download size");
                    0
                }
            };

            result.push(Kernel {
                sub_path: parsed.path().trim_start_matches('/').to_string(),
                url: kernel_url.clone(),
                size,
            });
            seen.insert(kernel_url);
        }

        Ok(result)
    }

    /// Determine the boot images referenced by partition boot configuration.
    ///
    /// Unlike kernels, boot images must expose a probeable `.md5` sidecar;
    /// entries without one are skipped.
    pub fn determine_boot_images(&self) -> Result<Vec<BootImage>, SelectionError> {
        let partitions = self.catalog.list_partitions()?;

        let mut result = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for partition in partitions {
            let Some(boot_config) = partition.boot_config else {
                continue;
            };
            let image_url = boot_config.image_url;

            if seen.contains(&image_url) {
                continue;
            }

            if self.is_excluded(&image_url) {
                debug!(url = %image_url, "skipping boot image with excluded URL");
                continue;
            }

            let parsed = match Url::parse(&image_url) {
                Ok(url) => url,
                Err(e) => {
                    error!(url = %image_url, error = %e, "boot image url is invalid, skipping");
                    continue;
                }
            };

            let size = match self.prober.content_length(&image_url) {
                Ok(size) => size,
                Err(e) => {
                    warn!(url = %image_url, error = %e, "unable to determine boot image download size");
                    0
                }
            };

            let md5_url = format!("{image_url}.md5");
            if let Err(e) = self.prober.content_length(&md5_url) {
                error!(url = %md5_url, error = %e, "boot image md5 does not exist, skipping");
                continue;
            }

            result.push(BootImage {
                sub_path: parsed.path().trim_start_matches('/').to_string(),
                url: image_url.clone(),
                size,
            });
            seen.insert(image_url);
        }

        Ok(result)
    }

    fn is_excluded(&self, url: &str) -> bool {
        self.policy
            .exclude_substrings
            .iter()
            .any(|exclude| url.contains(exclude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::catalog::{BootConfig, CatalogImage, Partition};
    use crate::entity::CacheEntity;

    struct MockCatalog {
        images: Vec<CatalogImage>,
        partitions: Vec<Partition>,
    }

    impl Catalog for MockCatalog {
        fn list_images(&self) -> Result<Vec<CatalogImage>, CatalogError> {
            Ok(self.images.clone())
        }

        fn list_partitions(&self) -> Result<Vec<Partition>, CatalogError> {
            Ok(self.partitions.clone())
        }
    }

    struct MockStore {
        objects: Vec<ObjectMeta>,
    }

    impl ObjectStore for MockStore {
        fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError> {
            Ok(self.objects.clone())
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

    struct MockProber {
        sizes: HashMap<String, u64>,
    }

    impl SizeProber for MockProber {
        fn content_length(&self, url: &str) -> Result<u64, ProbeError> {
            self.sizes
                .get(url)
                .copied()
                .ok_or_else(|| ProbeError::Status {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    fn policy() -> SelectionPolicy {
        SelectionPolicy {
            min_per_name: 1,
            max_per_name: Some(10),
            max_cache_size: 100 * 1024 * 1024 * 1024,
            exclude_substrings: vec!["/pull_requests/".to_string()],
            expiration_grace_days: 0,
        }
    }

    fn catalog_image(id: &str, url: &str) -> CatalogImage {
        CatalogImage {
            id: id.to_string(),
            url: url.to_string(),
            expiration_date: None,
        }
    }

    fn object(key: &str, size: u64) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size,
        }
    }

    fn selector(
        images: Vec<CatalogImage>,
        partitions: Vec<Partition>,
        objects: Vec<ObjectMeta>,
        sizes: HashMap<String, u64>,
        policy: SelectionPolicy,
    ) -> CandidateSelector {
        CandidateSelector::new(
            Arc::new(MockCatalog { images, partitions }),
            Arc::new(MockStore { objects }),
            Arc::new(MockProber { sizes }),
            policy,
            Arc::new(CacheMetrics::new()),
        )
    }

    #[test]
    fn test_determine_images_happy_path() {
        let s = selector(
            vec![catalog_image(
                "ubuntu-19.04.20200101",
                "https://images.example.org/ubuntu/19.04/20200101/img.tar.lz4",
            )],
            vec![],
            vec![
                object("ubuntu/19.04/20200101/img.tar.lz4", 100),
                object("ubuntu/19.04/20200101/img.tar.lz4.md5", 33),
            ],
            HashMap::new(),
            policy(),
        );

        let (images, size) = s.determine_images().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].sub_path(), "ubuntu/19.04/20200101/img.tar.lz4");
        assert_eq!(size, 100);
    }

    #[test]
    fn test_determine_images_skips_excluded() {
        let s = selector(
            vec![catalog_image(
                "hammer-1.0.1",
                "https://images.example.org/pull_requests/pr-1/img.tar.lz4",
            )],
            vec![],
            vec![
                object("pull_requests/pr-1/img.tar.lz4", 100),
                object("pull_requests/pr-1/img.tar.lz4.md5", 33),
            ],
            HashMap::new(),
            policy(),
        );

        let (images, _) = s.determine_images().unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_determine_images_skips_expired() {
        let mut expired = catalog_image(
            "ubuntu-19.04.20200101",
            "https://images.example.org/ubuntu/19.04/20200101/img.tar.lz4",
        );
        expired.expiration_date = Some(Utc::now() - Duration::days(10));

        let s = selector(
            vec![expired],
            vec![],
            vec![
                object("ubuntu/19.04/20200101/img.tar.lz4", 100),
                object("ubuntu/19.04/20200101/img.tar.lz4.md5", 33),
            ],
            HashMap::new(),
            policy(),
        );

        let (images, _) = s.determine_images().unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_determine_images_grace_period_keeps_expired() {
        let mut expired = catalog_image(
            "ubuntu-19.04.20200101",
            "https://images.example.org/ubuntu/19.04/20200101/img.tar.lz4",
        );
        expired.expiration_date = Some(Utc::now() - Duration::days(10));

        let mut p = policy();
        p.expiration_grace_days = 14;

        let s = selector(
            vec![expired],
            vec![],
            vec![
                object("ubuntu/19.04/20200101/img.tar.lz4", 100),
                object("ubuntu/19.04/20200101/img.tar.lz4.md5", 33),
            ],
            HashMap::new(),
            p,
        );

        let (images, _) = s.determine_images().unwrap();
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn test_determine_images_skips_malformed_id() {
        let s = selector(
            vec![catalog_image(
                "not_an_image_id",
                "https://images.example.org/x/img.tar.lz4",
            )],
            vec![],
            vec![object("x/img.tar.lz4", 100), object("x/img.tar.lz4.md5", 33)],
            HashMap::new(),
            policy(),
        );

        let (images, _) = s.determine_images().unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_determine_images_requires_artifact_and_sidecar_in_store() {
        // artifact present but no sidecar
        let s = selector(
            vec![catalog_image(
                "ubuntu-19.04.20200101",
                "https://images.example.org/ubuntu/19.04/20200101/img.tar.lz4",
            )],
            vec![],
            vec![object("ubuntu/19.04/20200101/img.tar.lz4", 100)],
            HashMap::new(),
            policy(),
        );

        let (images, _) = s.determine_images().unwrap();
        assert!(images.is_empty());
    }

    fn boot_partition(id: &str, kernel_url: &str, image_url: &str) -> Partition {
        Partition {
            id: id.to_string(),
            boot_config: Some(BootConfig {
                kernel_url: kernel_url.to_string(),
                image_url: image_url.to_string(),
            }),
        }
    }

    #[test]
    fn test_determine_kernels_dedupes_urls() {
        let kernel_url = "https://boot.example.org/kernels/v5.10/vmlinuz";
        let mut sizes = HashMap::new();
        sizes.insert(kernel_url.to_string(), 700u64);

        let s = selector(
            vec![],
            vec![
                boot_partition("p1", kernel_url, "https://boot.example.org/i1"),
                boot_partition("p2", kernel_url, "https://boot.example.org/i2"),
            ],
            vec![],
            sizes,
            policy(),
        );

        let kernels = s.determine_kernels().unwrap();
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].sub_path, "kernels/v5.10/vmlinuz");
        assert_eq!(kernels[0].size, 700);
    }

    #[test]
    fn test_determine_kernels_probe_failure_keeps_entry_with_zero_size() {
        let s = selector(
            vec![],
            vec![boot_partition(
                "p1",
                "https://boot.example.org/kernels/vmlinuz",
                "https://boot.example.org/i1",
            )],
            vec![],
            HashMap::new(),
            policy(),
        );

        let kernels = s.determine_kernels().unwrap();
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].size, 0);
    }

    #[test]
    fn test_determine_kernels_skips_partitions_without_boot_config() {
        let s = selector(
            vec![],
            vec![Partition {
                id: "p1".to_string(),
                boot_config: None,
            }],
            vec![],
            HashMap::new(),
            policy(),
        );

        assert!(s.determine_kernels().unwrap().is_empty());
    }

    #[test]
    fn test_determine_boot_images_requires_md5_sidecar() {
        let with_md5 = "https://boot.example.org/initrd-a.img.lz4";
        let without_md5 = "https://boot.example.org/initrd-b.img.lz4";

        let mut sizes = HashMap::new();
        sizes.insert(with_md5.to_string(), 100u64);
        sizes.insert(format!("{with_md5}.md5"), 33u64);
        sizes.insert(without_md5.to_string(), 100u64);

        let s = selector(
            vec![],
            vec![
                boot_partition("p1", "https://boot.example.org/k", with_md5),
                boot_partition("p2", "https://boot.example.org/k", without_md5),
            ],
            vec![],
            sizes,
            policy(),
        );

        let boot_images = s.determine_boot_images().unwrap();
        assert_eq!(boot_images.len(), 1);
        assert_eq!(boot_images[0].url, with_md5);
    }

    #[test]
    fn test_metrics_catalog_and_unsynced_counts() {
        let metrics = Arc::new(CacheMetrics::new());
        let s = CandidateSelector::new(
            Arc::new(MockCatalog {
                images: vec![
                    catalog_image(
                        "ubuntu-19.04.20200101",
                        "https://images.example.org/ubuntu/19.04/20200101/img.tar.lz4",
                    ),
                    catalog_image("broken", "https://images.example.org/broken/img.tar.lz4"),
                ],
                partitions: vec![],
            }),
            Arc::new(MockStore {
                objects: vec![
                    object("ubuntu/19.04/20200101/img.tar.lz4", 100),
                    object("ubuntu/19.04/20200101/img.tar.lz4.md5", 33),
                ],
            }),
            Arc::new(MockProber {
                sizes: HashMap::new(),
            }),
            policy(),
            Arc::clone(&metrics),
        );

        s.determine_images().unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.catalog_count, 2);
        assert_eq!(snapshot.unsynced_count, 1);
    }
}
