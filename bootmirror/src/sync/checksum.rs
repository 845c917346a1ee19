//! MD5 hashing of cached files for sidecar verification.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use super::SyncError;

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the MD5 digest of a file as lowercase hex.
///
/// Sidecars use MD5 because that is the checksum format the artifact
/// origin publishes alongside every image.
pub fn file_md5(path: &Path) -> Result<String, SyncError> {
    let mut file = File::open(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| SyncError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tempfile::TempDir;

    #[test]
    fn test_file_md5() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        let digest = file_md5(&file_path).unwrap();

        // MD5 of "hello world"
        assert_eq!(digest, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_file_md5_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.bin");
        File::create(&file_path).unwrap();

        let digest = file_md5(&file_path).unwrap();

        // MD5 of the empty string
        assert_eq!(digest, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_file_md5_missing_file() {
        let result = file_md5(Path::new("/nonexistent/file.bin"));
        assert!(matches!(result, Err(SyncError::ReadFailed { .. })));
    }

    #[test]
    fn test_file_md5_larger_than_buffer() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(&vec![0xABu8; 100_000]).unwrap();

        let first = file_md5(&file_path).unwrap();
        let second = file_md5(&file_path).unwrap();
        assert_eq!(first, second);
    }
}
