//! Content-addressed blob storage for dedupvault.
//!
//! This module provides physical storage for deduplicated content:
//! - Blobs named by their content hash
//! - Directory sharding by first 2 characters of the hash
//! - Atomic writes via a temporary file and rename

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{Result, VaultError};

/// Suffix marking an in-progress write.
const TEMP_SUFFIX: &str = ".partial";

/// Blob storage for physical content.
///
/// Blobs are stored in a sharded directory structure:
/// ```text
/// {base_path}/
/// ├── 2c/
/// │   └── 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
/// ├── e3/
/// │   └── e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct BlobStorage {
    /// Base directory for blob storage.
    base_path: PathBuf,
}

impl BlobStorage {
    /// Create a new BlobStorage with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;

        Ok(Self { base_path })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Write content under its hash.
    ///
    /// Returns `false` without touching the disk if the blob already exists.
    pub fn put(&self, hash: &str, content: &[u8]) -> Result<bool> {
        let blob_path = self.blob_path(hash)?;
        if blob_path.exists() {
            return Ok(false);
        }

        if let Some(parent) = blob_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Readers never see a partially written blob.
        let temp_path = blob_path.with_file_name(format!("{hash}.{}{TEMP_SUFFIX}", Uuid::new_v4()));
        if let Err(e) = fs::write(&temp_path, content) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &blob_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        Ok(true)
    }

    /// Load a blob.
    pub fn load(&self, hash: &str) -> Result<Vec<u8>> {
        let blob_path = self.blob_path(hash)?;

        match fs::read(&blob_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {hash}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it didn't exist.
    pub fn delete(&self, hash: &str) -> Result<bool> {
        let blob_path = self.blob_path(hash)?;

        match fs::remove_file(&blob_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a blob exists.
    pub fn exists(&self, hash: &str) -> bool {
        self.blob_path(hash).map(|p| p.exists()).unwrap_or(false)
    }

    /// Get the size of a stored blob.
    pub fn blob_size(&self, hash: &str) -> Result<u64> {
        let blob_path = self.blob_path(hash)?;

        match fs::metadata(&blob_path) {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {hash}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the full path for a hash: `{base_path}/{shard}/{hash}`.
    ///
    /// Only alphanumeric hashes of at least two characters are accepted, so a
    /// hash can never escape the base directory.
    pub fn blob_path(&self, hash: &str) -> Result<PathBuf> {
        if hash.len() < 2 || !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(VaultError::Validation(format!("invalid blob hash '{hash}'")));
        }
        Ok(self.base_path.join(Self::shard(hash)).join(hash))
    }

    /// Shard directory name for a hash (its first 2 characters).
    fn shard(hash: &str) -> &str {
        &hash[..2]
    }

    /// Clean up empty shard directories and abandoned partial writes.
    ///
    /// Returns the number of directories removed.
    pub fn cleanup_empty_dirs(&self) -> Result<usize> {
        let mut removed = 0;

        if let Ok(entries) = fs::read_dir(&self.base_path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                if let Ok(shard_entries) = fs::read_dir(&path) {
                    for blob in shard_entries.flatten() {
                        let name = blob.file_name();
                        if name.to_string_lossy().ends_with(TEMP_SUFFIX) {
                            let _ = fs::remove_file(blob.path());
                        }
                    }
                }
                if let Ok(shard_entries) = fs::read_dir(&path) {
                    if shard_entries.count() == 0 && fs::remove_dir(&path).is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        Ok(removed)
    }
}
