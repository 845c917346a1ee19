//! CLI commands.

pub mod run;
pub mod sync;

use std::path::{Path, PathBuf};

use bootmirror::{Config, ConfigError};
use tracing::{debug, info};

/// Load configuration from an explicit path or the default locations.
///
/// Without an explicit path the first existing candidate wins; when none
/// exists the built-in defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return Config::load(path);
    }

    for candidate in default_config_paths() {
        if candidate.exists() {
            info!(path = %candidate.display(), "loading config file");
            return Config::load(&candidate);
        }
    }

    debug!("no config file found, using defaults");
    Ok(Config::default())
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/bootmirror/config.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("bootmirror").join("config.toml"));
    }
    paths.push(PathBuf::from("config.toml"));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn test_load_config_explicit_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_images_per_name = 7\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_images_per_name, 7);
    }

    #[test]
    fn test_load_config_explicit_path_must_exist() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");

        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_default_config_paths_order() {
        let paths = default_config_paths();
        assert_eq!(paths[0], PathBuf::from("/etc/bootmirror/config.toml"));
        assert_eq!(paths.last().unwrap(), &PathBuf::from("config.toml"));
    }
}
