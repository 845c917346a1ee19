//! Service configuration.
//!
//! Configuration is stored as TOML (loaded by the CLI, with flag/env
//! overrides applied on top) and validated once before anything is built
//! from it. Sizes are human-readable strings (`"10G"`, `"512MiB"`, plain
//! bytes) parsed by [`parse_size`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::selection::SelectionPolicy;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("cannot parse size {0:?}")]
    InvalidSize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// All recognized options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root path under which all cached entities are stored.
    pub cache_root_path: PathBuf,

    /// Base URL of the catalog API.
    pub catalog_endpoint: String,

    /// Base URL of the image object store gateway.
    pub store_endpoint: String,

    /// Bucket holding OS images and their checksum sidecars.
    pub store_bucket: String,

    /// Bind address of the image cache HTTP server.
    pub image_bind_address: String,

    /// Whether to cache PXE kernels.
    pub kernel_cache_enabled: bool,

    /// Bind address of the kernel cache HTTP server.
    pub kernel_bind_address: String,

    /// Whether to cache boot initrd images.
    pub boot_image_cache_enabled: bool,

    /// Bind address of the boot image cache HTTP server.
    pub boot_image_bind_address: String,

    /// Seconds between sync cycles.
    pub sync_interval_secs: u64,

    /// Compute and report plans without touching disk or network.
    pub dry_run: bool,

    /// URL substrings excluded from syncing.
    pub exclude_paths: Vec<String>,

    /// Minimum images to keep per variant; eviction never goes below this.
    pub min_images_per_name: usize,

    /// Maximum images to cache per variant; zero or negative means
    /// unlimited.
    pub max_images_per_name: i64,

    /// Target cache size as a human-readable string.
    pub max_cache_size: String,

    /// Days to keep syncing images past their expiration date.
    pub expiration_grace_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root_path: PathBuf::from("/var/lib/bootmirror"),
            catalog_endpoint: String::new(),
            store_endpoint: String::new(),
            store_bucket: "images".to_string(),
            image_bind_address: "0.0.0.0:3000".to_string(),
            kernel_cache_enabled: true,
            kernel_bind_address: "0.0.0.0:3001".to_string(),
            boot_image_cache_enabled: true,
            boot_image_bind_address: "0.0.0.0:3002".to_string(),
            sync_interval_secs: 600,
            dry_run: false,
            exclude_paths: vec!["/pull_requests/".to_string()],
            min_images_per_name: 3,
            max_images_per_name: -1,
            max_cache_size: "10G".to_string(),
            expiration_grace_days: 0,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Validate option combinations and referenced paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cache_root_path.is_dir() {
            return Err(ConfigError::Invalid(format!(
                "cache root path {} is not a directory",
                self.cache_root_path.display()
            )));
        }

        if self.min_images_per_name < 1 {
            return Err(ConfigError::Invalid(
                "minimum images per name must be at least 1".to_string(),
            ));
        }

        if self.catalog_endpoint.is_empty() {
            return Err(ConfigError::Invalid(
                "catalog endpoint must be set".to_string(),
            ));
        }

        if self.store_endpoint.is_empty() {
            return Err(ConfigError::Invalid(
                "store endpoint must be set".to_string(),
            ));
        }

        if self.kernel_cache_enabled && self.kernel_bind_address.is_empty() {
            return Err(ConfigError::Invalid(
                "kernel cache bind address must be set".to_string(),
            ));
        }

        if self.boot_image_cache_enabled && self.boot_image_bind_address.is_empty() {
            return Err(ConfigError::Invalid(
                "boot image cache bind address must be set".to_string(),
            ));
        }

        parse_size(&self.max_cache_size)?;

        Ok(())
    }

    /// The cache subtree for OS images.
    pub fn image_root_path(&self) -> PathBuf {
        self.cache_root_path.join("images")
    }

    /// The cache subtree for kernels.
    pub fn kernel_root_path(&self) -> PathBuf {
        self.cache_root_path.join("kernels")
    }

    /// The cache subtree for boot images.
    pub fn boot_image_root_path(&self) -> PathBuf {
        self.cache_root_path.join("boot-images")
    }

    /// The scratch directory downloads stream through.
    pub fn tmp_download_path(&self) -> PathBuf {
        self.cache_root_path.join("tmp")
    }

    /// Build the selection policy from the retention options.
    pub fn selection_policy(&self) -> Result<SelectionPolicy, ConfigError> {
        let max_per_name = if self.max_images_per_name > 0 {
            Some(self.max_images_per_name as usize)
        } else {
            None
        };

        Ok(SelectionPolicy {
            min_per_name: self.min_images_per_name,
            max_per_name,
            max_cache_size: parse_size(&self.max_cache_size)?,
            exclude_substrings: self.exclude_paths.clone(),
            expiration_grace_days: self.expiration_grace_days,
        })
    }
}

/// Parse a human-readable size string into bytes.
///
/// Accepts a plain byte count, decimal suffixes (`K`, `M`, `G`, `T`,
/// optionally with a trailing `B`) and binary suffixes (`Ki`, `Mi`, `Gi`,
/// `Ti`, optionally with a trailing `B`). Case-insensitive.
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidSize(input.to_string()));
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidSize(input.to_string()))?;

    let multiplier: u64 = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "m" | "mb" => 1_000_000,
        "g" | "gb" => 1_000_000_000,
        "t" | "tb" => 1_000_000_000_000,
        "ki" | "kib" => 1 << 10,
        "mi" | "mib" => 1 << 20,
        "gi" | "gib" => 1 << 30,
        "ti" | "tib" => 1 << 40,
        _ => return Err(ConfigError::InvalidSize(input.to_string())),
    };

    Ok((value * multiplier as f64) as u64)
}
