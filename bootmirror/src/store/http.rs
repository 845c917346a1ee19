//! HTTP implementation of the object store client.
//!
//! Speaks to an S3-compatible gateway with anonymous read access. The
//! bucket listing is served as a JSON array of `{key, size}` documents at
//! `{endpoint}/{bucket}?format=json`; objects are plain
//! `GET {endpoint}/{bucket}/{key}`.

use std::io::{Read, Write};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ObjectMeta, ObjectStore, StoreError};

/// Default timeout for store requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Buffer size for streaming object reads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Object store client over plain HTTP.
pub struct HttpObjectStore {
    endpoint: String,
    bucket: String,
    client: reqwest::blocking::Client,
    cancel: CancellationToken,
}

impl HttpObjectStore {
    /// Create a client for one bucket.
    ///
    /// `endpoint` is the gateway base URL without a trailing slash.
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, cancel: CancellationToken) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            client,
            cancel,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn listing_url(&self) -> String {
        format!("{}/{}?format=json", self.endpoint, self.bucket)
    }
}

impl ObjectStore for HttpObjectStore {
    fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let url = self.listing_url();
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| StoreError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let objects: Vec<ObjectMeta> = response
            .json()
            .map_err(|e| StoreError::Listing(e.to_string()))?;

        debug!(bucket = %self.bucket, objects = objects.len(), "listed bucket");
        Ok(objects)
    }

    fn get_object(&self, key: &str, target: &mut dyn Write) -> Result<u64, StoreError> {
        let url = self.object_url(key);
        let mut response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| StoreError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut written = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }

            let bytes_read = response.read(&mut buffer).map_err(|e| StoreError::Request {
                url: url.clone(),
                reason: format!("read error: {e}"),
            })?;

            if bytes_read == 0 {
                break;
            }

            target
                .write_all(&buffer[..bytes_read])
                .map_err(|e| StoreError::Write {
                    key: key.to_string(),
                    source: e,
                })?;

            written += bytes_read as u64;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url() {
        let store = HttpObjectStore::new(
            "https://images.example.org",
            "images",
            CancellationToken::new(),
        );
        assert_eq!(
            store.object_url("ubuntu/19.04/20200101/img.tar.lz4"),
            "https://images.example.org/images/ubuntu/19.04/20200101/img.tar.lz4"
        );
    }

    #[test]
    fn test_listing_url() {
        let store = HttpObjectStore::new("http://store", "b", CancellationToken::new());
        assert_eq!(store.listing_url(), "http://store/b?format=json");
    }
}
