//! Remote catalog access.
//!
//! The catalog is the source of truth for which OS images exist and which
//! kernel/boot-image URLs each partition's boot configuration references.
//! The [`Catalog`] trait captures the two listings the sync engine
//! consumes; [`HttpCatalog`] implements them against the catalog's JSON
//! API.

mod http;

pub use http::HttpCatalog;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised by catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A request to the catalog failed.
    #[error("catalog request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The catalog answered with a non-success status.
    #[error("catalog returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// A response document could not be decoded.
    #[error("cannot decode catalog response: {0}")]
    Decode(String),

    /// The operation was cancelled by process shutdown.
    #[error("catalog operation cancelled")]
    Cancelled,
}

/// One image entry in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogImage {
    /// Identifier of the form `<name>-<version-tail>`.
    pub id: String,

    /// Download URL; its path is the object-store bucket key.
    pub url: String,

    /// Optional expiration timestamp.
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
}

/// Boot configuration of a partition.
#[derive(Debug, Clone, Deserialize)]
pub struct BootConfig {
    /// URL of the PXE kernel.
    pub kernel_url: String,

    /// URL of the boot initrd image.
    pub image_url: String,
}

/// One partition entry in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct Partition {
    /// Partition identifier.
    pub id: String,

    /// Boot configuration; absent for partitions that do not PXE boot.
    #[serde(default)]
    pub boot_config: Option<BootConfig>,
}

/// Listing access to the remote catalog.
pub trait Catalog: Send + Sync {
    /// List all images known to the catalog.
    fn list_images(&self) -> Result<Vec<CatalogImage>, CatalogError>;

    /// List all partitions known to the catalog.
    fn list_partitions(&self) -> Result<Vec<Partition>, CatalogError>;
}
