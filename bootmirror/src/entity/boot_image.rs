//! Boot initrd entities fetched from an HTTP origin.

use std::io::Write;

use super::version::version_or_url;
use super::{parse_checksum, stream_url, CacheEntity, EntityError, TransferContext};

/// A boot initrd image referenced by some partition's boot configuration.
///
/// Unlike kernels, boot images publish an `.md5` sidecar next to the
/// artifact, so cached copies are checksum-verified on every cycle.
#[derive(Debug, Clone)]
pub struct BootImage {
    /// Relative cache path derived from the URL path.
    pub sub_path: String,

    /// Origin URL.
    pub url: String,

    /// Size from the HEAD probe; `0` when the probe failed.
    pub size: u64,
}

impl BootImage {
    fn checksum_url(&self) -> String {
        format!("{}.md5", self.url)
    }
}

impl CacheEntity for BootImage {
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
        true
    }

    fn download(&self, ctx: &TransferContext, target: &mut dyn Write) -> Result<u64, EntityError> {
        stream_url(ctx, &self.url, &self.sub_path, target)
    }

    fn fetch_checksum(&self, ctx: &TransferContext) -> Result<String, EntityError> {
        let mut buffer = Vec::new();
        stream_url(ctx, &self.checksum_url(), &self.sub_path, &mut buffer)?;
        let body = String::from_utf8_lossy(&buffer);
        parse_checksum(&body, &self.sub_path)
    }

    fn save_checksum(
        &self,
        ctx: &TransferContext,
        target: &mut dyn Write,
    ) -> Result<(), EntityError> {
        stream_url(ctx, &self.checksum_url(), &self.sub_path, target)?;
        Ok(())
    }
}
