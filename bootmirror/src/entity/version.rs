//! Version parsing for catalog identifiers and artifact URLs.
//!
//! Catalog image identifiers follow the `<name>-<version-tail>` convention
//! where the tail is everything after the last hyphen (`ubuntu-19.04.20200101`,
//! `firewall-ubuntu-2.0.20210207`). The tails are calendar-flavoured and
//! frequently contain leading zeros, which strict semver rejects, so parsing
//! first tries strict semver and then falls back to a tolerant numeric read.

use semver::Version;
use thiserror::Error;

/// Errors produced while deriving versions from identifiers or URLs.
#[derive(Debug, Error)]
pub enum VersionError {
    /// The identifier has no hyphen separating name from version tail.
    #[error("identifier {0:?} is not of the form <name>-<version>")]
    MissingSeparator(String),

    /// The version tail could not be parsed as a version.
    #[error("cannot parse {0:?} as a version")]
    Unparsable(String),
}

/// Split a catalog image identifier into OS name and version.
///
/// The version tail is everything after the *last* hyphen, so names may
/// themselves contain hyphens (`firewall-ubuntu-2.0.20210207` yields
/// `firewall-ubuntu` / `2.0.20210207`).
pub fn parse_os_and_version(id: &str) -> Result<(String, Version), VersionError> {
    let (name, tail) = id
        .rsplit_once('-')
        .ok_or_else(|| VersionError::MissingSeparator(id.to_string()))?;

    if name.is_empty() {
        return Err(VersionError::MissingSeparator(id.to_string()));
    }

    let version = lenient_version(tail)?;
    Ok((name.to_string(), version))
}

/// Parse a version string, tolerating calendar-style tails.
///
/// Strict semver is tried first so pre-release and build metadata keep
/// working. The fallback accepts one to three dot-separated numeric
/// segments with leading zeros (`19.04` becomes `19.4.0`, `20200101`
/// becomes `20200101.0.0`). A leading `v` is stripped in both paths.
pub fn lenient_version(input: &str) -> Result<Version, VersionError> {
    let raw = input.strip_prefix('v').unwrap_or(input);

    if let Ok(version) = Version::parse(raw) {
        return Ok(version);
    }

    let segments: Vec<&str> = raw.split('.').collect();
    if segments.is_empty() || segments.len() > 3 || raw.is_empty() {
        return Err(VersionError::Unparsable(input.to_string()));
    }

    let mut numbers = [0u64; 3];
    for (i, segment) in segments.iter().enumerate() {
        numbers[i] = segment
            .parse::<u64>()
            .map_err(|_| VersionError::Unparsable(input.to_string()))?;
    }

    Ok(Version::new(numbers[0], numbers[1], numbers[2]))
}

/// Find a version embedded in a URL path, if any.
///
/// Walks the `/`-separated segments and returns the first one that parses
/// as a version. Used to give kernels and boot images a display name when
/// their URL carries a release version (`.../releases/download/v0.8.0/...`).
pub fn version_in_url(url: &str) -> Option<Version> {
    url.split('/').find_map(|segment| lenient_version(segment).ok())
}

/// The version found in the URL, rendered as a string, or the URL itself.
pub fn version_or_url(url: &str) -> String {
    match version_in_url(url) {
        Some(version) => version.to_string(),
        None => url.to_string(),
    }
}
