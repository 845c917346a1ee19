//! Sync and serving metrics.
//!
//! Each artifact kind owns one [`CacheMetrics`] instance: lock-free atomic
//! counters written by the sync engine and the file server, read as a
//! point-in-time [`MetricsSnapshot`] by the `/metrics` endpoint.
//!
//! ```text
//! Selector / Syncer / Server ──► CacheMetrics ──► MetricsSnapshot ──► /metrics
//!                                (atomic counters)  (point-in-time copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Lock-free counters for one artifact kind.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Number of artifacts the catalog currently advertises (gauge).
    catalog_count: AtomicU64,

    /// Number of catalog artifacts not selected for the cache (gauge).
    unsynced_count: AtomicU64,

    /// Bytes downloaded by the sync engine over the process lifetime.
    sync_downloaded_bytes: AtomicU64,

    /// Files downloaded by the sync engine over the process lifetime.
    sync_downloaded_files: AtomicU64,

    /// Files served to cache clients over the process lifetime.
    files_served: AtomicU64,

    /// Requests that missed the cache and were redirected.
    cache_misses: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_catalog_count(&self, count: u64) {
        self.catalog_count.store(count, Ordering::Relaxed);
    }

    pub fn set_unsynced_count(&self, count: u64) {
        self.unsynced_count.store(count, Ordering::Relaxed);
    }

    pub fn add_downloaded_bytes(&self, bytes: u64) {
        self.sync_downloaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn file_downloaded(&self) {
        self.sync_downloaded_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_served(&self) {
        self.files_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            catalog_count: self.catalog_count.load(Ordering::Relaxed),
            unsynced_count: self.unsynced_count.load(Ordering::Relaxed),
            sync_downloaded_bytes: self.sync_downloaded_bytes.load(Ordering::Relaxed),
            sync_downloaded_files: self.sync_downloaded_files.load(Ordering::Relaxed),
            files_served: self.files_served.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of one kind's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub catalog_count: u64,
    pub unsynced_count: u64,
    pub sync_downloaded_bytes: u64,
    pub sync_downloaded_files: u64,
    pub files_served: u64,
    pub cache_misses: u64,
}

/// One metrics instance per artifact kind.
#[derive(Debug, Clone, Default)]
pub struct MetricsRegistry {
    pub images: Arc<CacheMetrics>,
    pub kernels: Arc<CacheMetrics>,
    pub boot_images: Arc<CacheMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
