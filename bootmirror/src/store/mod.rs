//! Object store access for image artifacts.
//!
//! The sync engine only needs two operations from the store that hosts OS
//! images and their checksum sidecars: a full listing (to cross-reference
//! catalog entries against what actually exists) and a streaming read. The
//! [`ObjectStore`] trait captures exactly that, allowing mock stores in
//! tests; [`HttpObjectStore`] is the production implementation against an
//! anonymous-read HTTP gateway.

mod http;

pub use http::HttpObjectStore;

use std::io::Write;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised by object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A request to the store failed.
    #[error("object store request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The store answered with a non-success status.
    #[error("object store returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// The listing document could not be decoded.
    #[error("cannot decode object listing: {0}")]
    Listing(String),

    /// The requested object does not exist.
    #[error("object {key} not found")]
    NotFound { key: String },

    /// Writing the object bytes to the target failed.
    #[error("write failed while reading object {key}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled by process shutdown.
    #[error("object store operation cancelled")]
    Cancelled,
}

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObjectMeta {
    /// Object key, relative to the bucket.
    pub key: String,

    /// Object size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// Listing and streaming-read access to a single bucket.
pub trait ObjectStore: Send + Sync {
    /// List every object in the bucket.
    fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError>;

    /// Stream the object at `key` into `target`, returning the bytes read.
    fn get_object(&self, key: &str, target: &mut dyn Write) -> Result<u64, StoreError>;
}
