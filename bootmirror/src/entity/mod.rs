//! The cache entity model.
//!
//! Everything the sync engine moves around is a [`CacheEntity`]: an OS
//! image held in the object store, a PXE kernel or boot initrd referenced
//! by partition boot configuration, or a plain record of a file already on
//! disk. The trait carries the minimal capability surface the diff engine
//! and materializer need — identity (`sub_path`), size, checksum
//! capability, and the transfer operations.
//!
//! Identity is the relative path under the cache root: two entities are
//! "the same slot" exactly when their `sub_path` matches. Checksum
//! sidecars (`<sub_path>.md5`) are derived from the owning entity and are
//! never entities themselves.

mod boot_image;
mod image;
mod kernel;
mod local;
pub mod version;

pub use boot_image::BootImage;
pub use image::{sort_by_name_version, OsImage};
pub use kernel::Kernel;
pub use local::LocalFile;

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::store::{ObjectStore, StoreError};

/// Default timeout for entity HTTP transfers.
const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 300;

/// Errors raised by entity transfer operations.
#[derive(Debug, Error)]
pub enum EntityError {
    /// An HTTP request failed or returned a non-success status.
    #[error("http transfer of {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// The object store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A checksum document did not contain a checksum token.
    #[error("checksum file for {sub_path} has unexpected format")]
    ChecksumFormat { sub_path: String },

    /// Checksum requested from an entity kind that carries none.
    #[error("{sub_path} has no checksum sidecar")]
    NoChecksum { sub_path: String },

    /// Download requested from an entity kind that cannot be downloaded.
    #[error("{sub_path} is a local record and cannot be downloaded")]
    NotDownloadable { sub_path: String },

    /// The transfer was cancelled by process shutdown.
    #[error("transfer cancelled")]
    Cancelled,

    /// Writing the transferred bytes to the target failed.
    #[error("write failed during transfer of {sub_path}")]
    Write {
        sub_path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared handles every transfer operation needs.
///
/// Threaded explicitly through the syncer instead of living in globals:
/// the blocking HTTP client for origin downloads, the object store for
/// image artifacts, and the cancellation token tied to process shutdown.
#[derive(Clone)]
pub struct TransferContext {
    pub http: reqwest::blocking::Client,
    pub store: Arc<dyn ObjectStore>,
    pub cancel: CancellationToken,
}

impl TransferContext {
    pub fn new(store: Arc<dyn ObjectStore>, cancel: CancellationToken) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self { http, store, cancel }
    }
}

impl fmt::Debug for TransferContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferContext")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Capability surface shared by all cacheable artifact kinds.
pub trait CacheEntity: Send + Sync + fmt::Debug {
    /// Display identifier: the catalog id or derived version where
    /// available, the raw URL or file name otherwise.
    fn name(&self) -> String;

    /// Relative path under the cache root. This is the identity key.
    fn sub_path(&self) -> &str;

    /// Byte length as reported by catalog or probe metadata; `0` when the
    /// size could not be determined.
    fn size(&self) -> u64;

    /// Whether a companion checksum artifact exists remotely.
    fn has_checksum(&self) -> bool;

    /// Stream the artifact into `target`, returning the bytes written.
    fn download(&self, ctx: &TransferContext, target: &mut dyn Write) -> Result<u64, EntityError>;

    /// Fetch the remote checksum and return it in memory.
    fn fetch_checksum(&self, ctx: &TransferContext) -> Result<String, EntityError>;

    /// Stream the remote checksum document into `target`.
    fn save_checksum(&self, ctx: &TransferContext, target: &mut dyn Write)
        -> Result<(), EntityError>;
}

/// An ordered batch of entities.
pub type CacheEntities = Vec<Box<dyn CacheEntity>>;

/// Buffer size for streaming HTTP downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Stream an HTTP URL into `target`, honouring cancellation.
///
/// The cancellation token is checked between chunks so an in-flight
/// download aborts promptly on shutdown.
pub(crate) fn stream_url(
    ctx: &TransferContext,
    url: &str,
    sub_path: &str,
    target: &mut dyn Write,
) -> Result<u64, EntityError> {
    use std::io::Read;

    let mut response = ctx
        .http
        .get(url)
        .send()
        .map_err(|e| EntityError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(EntityError::Http {
            url: url.to_string(),
            reason: format!("GET request returned status {status}"),
        });
    }

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut written = 0u64;

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(EntityError::Cancelled);
        }

        let bytes_read = response.read(&mut buffer).map_err(|e| EntityError::Http {
            url: url.to_string(),
            reason: format!("read error: {e}"),
        })?;

        if bytes_read == 0 {
            break;
        }

        target
            .write_all(&buffer[..bytes_read])
            .map_err(|e| EntityError::Write {
                sub_path: sub_path.to_string(),
                source: e,
            })?;

        written += bytes_read as u64;
    }

    Ok(written)
}

/// Extract the checksum token from a sidecar document.
///
/// Sidecars follow the md5sum convention `<hex-digest>  <filename>`; only
/// the first whitespace-separated token matters.
pub(crate) fn parse_checksum(body: &str, sub_path: &str) -> Result<String, EntityError> {
    body.split_whitespace()
        .next()
        .map(|token| token.to_string())
        .ok_or_else(|| EntityError::ChecksumFormat {
            sub_path: sub_path.to_string(),
        })
}
