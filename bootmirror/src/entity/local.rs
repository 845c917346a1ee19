//! Records of files already present in the cache.

use std::io::Write;

use super::{CacheEntity, EntityError, TransferContext};

/// A plain file found while indexing a cache root.
///
/// Local records exist only on the `current` side of a diff; they cannot
/// be downloaded and carry no checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// File name, used as the display identifier.
    pub name: String,

    /// Relative path under the cache root.
    pub sub_path: String,

    /// On-disk size in bytes.
    pub size: u64,
}

impl CacheEntity for LocalFile {
    fn name(&self) -> String {
        self.name.clone()
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

    fn download(
        &self,
        _ctx: &TransferContext,
        _target: &mut dyn Write,
    ) -> Result<u64, EntityError> {
        Err(EntityError::NotDownloadable {
            sub_path: self.sub_path.clone(),
        })
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
