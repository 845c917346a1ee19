//! Shared test doubles for the sync module.

use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::entity::{CacheEntity, EntityError, TransferContext};
use crate::store::{ObjectMeta, ObjectStore, StoreError};

/// Object store that contains nothing.
pub(crate) struct EmptyStore;

impl ObjectStore for EmptyStore {
    fn list_objects(&self) -> Result<Vec<ObjectMeta>, StoreError> {
        Ok(vec![])
    }

    fn get_object(&self, key: &str, _target: &mut dyn Write) -> Result<u64, StoreError> {
        Err(StoreError::NotFound {
            key: key.to_string(),
        })
    }
}

/// A transfer context that never reaches the network.
pub(crate) fn test_ctx() -> TransferContext {
    TransferContext::new(Arc::new(EmptyStore), CancellationToken::new())
}

/// Configurable in-memory entity.
#[derive(Debug, Clone)]
pub(crate) struct MockEntity {
    pub sub_path: String,
    pub size: u64,
    pub has_checksum: bool,
    /// `None` makes checksum fetches fail.
    pub remote_checksum: Option<String>,
    pub payload: Vec<u8>,
    pub fail_download: bool,
}

impl MockEntity {
    pub fn new(sub_path: &str) -> Self {
        Self {
            sub_path: sub_path.to_string(),
            size: 0,
            has_checksum: false,
            remote_checksum: None,
            payload: Vec::new(),
            fail_download: false,
        }
    }

    pub fn with_checksum(mut self, checksum: &str) -> Self {
        self.has_checksum = true;
        self.remote_checksum = Some(checksum.to_string());
        self
    }

    pub fn with_failing_checksum(mut self) -> Self {
        self.has_checksum = true;
        self.remote_checksum = None;
        self
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self.size = payload.len() as u64;
        self
    }

    pub fn with_failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }
}

impl CacheEntity for MockEntity {
    fn name(&self) -> String {
        self.sub_path.clone()
    }

    fn sub_path(&self) -> &str {
        &self.sub_path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn has_checksum(&self) -> bool {
        self.has_checksum
    }

    fn download(
        &self,
        _ctx: &TransferContext,
        target: &mut dyn Write,
    ) -> Result<u64, EntityError> {
        if self.fail_download {
            return Err(EntityError::Http {
                url: self.sub_path.clone(),
                reason: "mock download failure".to_string(),
            });
        }

        target
            .write_all(&self.payload)
            .map_err(|e| EntityError::Write {
                sub_path: self.sub_path.clone(),
                source: e,
            })?;
        Ok(self.payload.len() as u64)
    }

    fn fetch_checksum(&self, _ctx: &TransferContext) -> Result<String, EntityError> {
        if !self.has_checksum {
            return Err(EntityError::NoChecksum {
                sub_path: self.sub_path.clone(),
            });
        }

        self.remote_checksum
            .clone()
            .ok_or_else(|| EntityError::Http {
                url: self.sub_path.clone(),
                reason: "mock checksum failure".to_string(),
            })
    }

    fn save_checksum(
        &self,
        ctx: &TransferContext,
        target: &mut dyn Write,
    ) -> Result<(), EntityError> {
        let checksum = self.fetch_checksum(ctx)?;
        target
            .write_all(format!("{checksum}  {}\n", self.sub_path).as_bytes())
            .map_err(|e| EntityError::Write {
                sub_path: self.sub_path.clone(),
                source: e,
            })
    }
}
