//! PXE kernel entities fetched from an HTTP origin.

use std::io::Write;

use super::version::version_or_url;
use super::{stream_url, CacheEntity, EntityError, TransferContext};

/// A kernel referenced by some partition's boot configuration.
///
/// Kernels carry no checksum sidecar; once on disk they are kept as long
/// as the boot configuration references them.
#[derive(Debug, Clone)]
pub struct Kernel {
    /// Relative cache path derived from the URL path.
    pub sub_path: String,

    /// Origin URL.
    pub url: String,

    /// Size from the HEAD probe; `0` when the probe failed.
    pub size: u64,
}

impl CacheEntity for Kernel {
    fn name(&self) -> String {
        version_or_url(&self.url)
    }

    fn sub_path(&self) -> &str {
        &self.sub_path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn has_checksum(&self) -> bool {
        false
    }

    fn download(&self, ctx: &TransferContext, target: &mut dyn Write) -> Result<u64, EntityError> {
        stream_url(ctx, &self.url, &self.sub_path, target)
    }

    fn fetch_checksum(&self, _ctx: &TransferContext) -> Result<String, EntityError> {
        Err(EntityError::NoChecksum {
            sub_path: self.sub_path.clone(),
        })
    }

    fn save_checksum(
        &self,
        _ctx: &TransferContext,
        _target: &mut dyn Write,
    ) -> Result<(), EntityError> {
        Err(EntityError::NoChecksum {
            sub_path: self.sub_path.clone(),
        })
    }
}
