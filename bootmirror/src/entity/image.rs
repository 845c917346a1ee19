//! OS image entities backed by the object store.

use std::io::Write;

use chrono::{DateTime, Utc};
use semver::Version;

use crate::store::ObjectMeta;

use super::{parse_checksum, CacheEntity, EntityError, TransferContext};

/// An operating-system image selected from the remote catalog.
///
/// Carries both the catalog reference (id, expiration) and the object-store
/// metadata for the artifact and its checksum sidecar. The bucket key is
/// the URL path stripped of its leading slash and doubles as the cache
/// `sub_path`.
#[derive(Debug, Clone)]
pub struct OsImage {
    /// OS name parsed from the catalog id (`ubuntu`, `firewall-ubuntu`).
    pub os_name: String,

    /// Full semantic version parsed from the catalog id tail.
    pub version: Version,

    /// Catalog identifier (`ubuntu-19.04.20200101`).
    pub id: String,

    /// Catalog expiration timestamp, if any.
    pub expiration: Option<DateTime<Utc>>,

    /// Object-store metadata of the image artifact.
    pub artifact: ObjectMeta,

    /// Object-store metadata of the `.md5` sidecar.
    pub checksum: ObjectMeta,
}

impl OsImage {
    /// The `"{major}.{minor}"` retention bucket key.
    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }

    /// The `"{name}-{major}.{minor}"` eviction group key.
    pub fn eviction_group(&self) -> String {
        format!("{}-{}", self.os_name, self.major_minor())
    }
}

impl CacheEntity for OsImage {
    fn name(&self) -> String {
        self.id.clone()
    }

    fn sub_path(&self) -> &str {
        &self.artifact.key
    }

    fn size(&self) -> u64 {
        self.artifact.size
    }

    fn has_checksum(&self) -> bool {
        true
    }

    fn download(&self, ctx: &TransferContext, target: &mut dyn Write) -> Result<u64, EntityError> {
        let written = ctx.store.get_object(&self.artifact.key, target)?;
        Ok(written)
    }

    fn fetch_checksum(&self, ctx: &TransferContext) -> Result<String, EntityError> {
        let mut buffer = Vec::new();
        ctx.store.get_object(&self.checksum.key, &mut buffer)?;
        let body = String::from_utf8_lossy(&buffer);
        parse_checksum(&body, self.sub_path())
    }

    fn save_checksum(
        &self,
        ctx: &TransferContext,
        target: &mut dyn Write,
    ) -> Result<(), EntityError> {
        ctx.store.get_object(&self.checksum.key, target)?;
        Ok(())
    }
}

/// Sort images by OS name ascending, then version ascending.
///
/// This ordering makes the eviction loop deterministic: within an eviction
/// group the first member is always the oldest version.
pub fn sort_by_name_version(images: &mut [OsImage]) {
    images.sort_by(|a, b| {
        a.os_name
            .cmp(&b.os_name)
            .then_with(|| a.version.cmp(&b.version))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_image(os_name: &str, version: Version, key: &str, size: u64) -> OsImage {
        OsImage {
            os_name: os_name.to_string(),
            version: version.clone(),
            id: format!("{os_name}-{version}"),
            expiration: None,
            artifact: ObjectMeta {
                key: key.to_string(),
                size,
            },
            checksum: ObjectMeta {
                key: format!("{key}.md5"),
                size: 33,
            },
        }
    }

    #[test]
    fn test_major_minor() {
        let image = test_image("ubuntu", Version::new(19, 4, 20200101), "k", 1);
        assert_eq!(image.major_minor(), "19.4");
        assert_eq!(image.eviction_group(), "ubuntu-19.4");
    }

    #[test]
    fn test_sort_by_name_version() {
        let mut images = vec![
            test_image("ubuntu", Version::new(20, 10, 1), "c", 1),
            test_image("debian", Version::new(10, 0, 2), "b", 1),
            test_image("ubuntu", Version::new(19, 4, 1), "a", 1),
        ];
        sort_by_name_version(&mut images);

        let order: Vec<(&str, &Version)> = images
            .iter()
            .map(|i| (i.os_name.as_str(), &i.version))
            .collect();
        assert_eq!(order[0].0, "debian");
        assert_eq!(order[1], ("ubuntu", &Version::new(19, 4, 1)));
        assert_eq!(order[2], ("ubuntu", &Version::new(20, 10, 1)));
    }
}
