//! HTTP implementation of the catalog client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Catalog, CatalogError, CatalogImage, Partition};

/// Default timeout for catalog requests.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Catalog client over the JSON API.
pub struct HttpCatalog {
    base: String,
    client: reqwest::blocking::Client,
    cancel: CancellationToken,
}

impl HttpCatalog {
    /// Create a client for the catalog at `base` (no trailing slash).
    pub fn new(base: impl Into<String>, cancel: CancellationToken) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self {
            base: base.into(),
            client,
            cancel,
        }
    }

    fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, CatalogError> {
        if self.cancel.is_cancelled() {
            return Err(CatalogError::Cancelled);
        }

        let url = format!("{}{}", self.base, path);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| CatalogError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response.json().map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

impl Catalog for HttpCatalog {
    fn list_images(&self) -> Result<Vec<CatalogImage>, CatalogError> {
        let images: Vec<CatalogImage> = self.list("/v1/image")?;
        debug!(images = images.len(), "listed catalog images");
        Ok(images)
    }

    fn list_partitions(&self) -> Result<Vec<Partition>, CatalogError> {
        let partitions: Vec<Partition> = self.list("/v1/partition")?;
        debug!(partitions = partitions.len(), "listed catalog partitions");
        Ok(partitions)
    }
}
