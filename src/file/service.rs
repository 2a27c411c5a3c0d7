//! File service for dedupvault.
//!
//! This module provides high-level file operations including:
//! - Upload with size, name and extension checks
//! - Download of the deduplicated content behind a reference
//! - Deletion that releases the blob with its last reference

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::accounting::{
    DeleteOutcome, FileReference, NewUpload, StorageAccounting, UploadOutcome,
    MAX_FILENAME_LENGTH,
};
use crate::config::FilesConfig;
use crate::{Result, VaultError};

use super::hash::hash_content;
use super::locks::HashLocks;
use super::storage::BlobStorage;
use super::DEFAULT_MAX_FILE_SIZE;

/// Content type used when neither the client nor the extension names one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Request data for file upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Original filename.
    pub filename: String,
    /// Content type reported by the client.
    pub content_type: Option<String>,
    /// File content.
    pub content: Vec<u8>,
}

impl UploadRequest {
    /// Create a new upload request.
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            content,
        }
    }

    /// Set the client-reported content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of a file download.
#[derive(Debug)]
pub struct DownloadResult {
    /// The reference that was downloaded.
    pub reference: FileReference,
    /// File content.
    pub content: Vec<u8>,
}

/// File service tying blob storage to storage accounting.
pub struct FileService {
    accounting: Arc<StorageAccounting>,
    storage: BlobStorage,
    locks: HashLocks,
    max_file_size: u64,
    allowed_extensions: Vec<String>,
}

impl FileService {
    /// Create a new FileService.
    pub fn new(accounting: Arc<StorageAccounting>, storage: BlobStorage) -> Self {
        Self {
            accounting,
            storage,
            locks: HashLocks::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: Vec::new(),
        }
    }

    /// Create a FileService using the limits from `config`.
    pub fn from_config(accounting: Arc<StorageAccounting>, config: &FilesConfig) -> Result<Self> {
        let storage = BlobStorage::new(&config.storage_path)?;
        Ok(Self::new(accounting, storage)
            .with_max_file_size(config.max_upload_bytes())
            .with_allowed_extensions(config.allowed_extensions.clone()))
    }

    /// Create a new FileService with a custom max file size.
    pub fn with_max_file_size(mut self, max_size: u64) -> Self {
        self.max_file_size = max_size;
        self
    }

    /// Restrict uploads to these extensions (case-insensitive, no dot).
    ///
    /// An empty list allows every extension.
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Get the accounting service.
    pub fn accounting(&self) -> &Arc<StorageAccounting> {
        &self.accounting
    }

    /// Get the blob storage.
    pub fn storage(&self) -> &BlobStorage {
        &self.storage
    }

    /// Get the max file size in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Upload a file.
    ///
    /// # Validation
    /// - Filename: non-empty, max 255 characters
    /// - Extension: must be allowed when an allow-list is configured
    /// - File size: max configured size (default 10MB)
    ///
    /// # Returns
    /// The created reference and whether its content was already stored.
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadOutcome> {
        let filename = request.filename.trim();
        self.validate_filename(filename)?;

        if request.content.len() as u64 > self.max_file_size {
            return Err(VaultError::Validation(format!(
                "file is too large (max {} bytes)",
                self.max_file_size
            )));
        }

        let content_type = request
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(filename));

        let hash = hash_content(&request.content);
        let size = i64::try_from(request.content.len())
            .map_err(|_| VaultError::Validation("file is too large".to_string()))?;

        let _guard = self.locks.lock(&hash).await;

        let wrote_blob = self.storage.put(&hash, &request.content)?;
        if wrote_blob {
            debug!(hash = %hash, size, "Stored new blob");
        }

        let upload = NewUpload::new(&hash, size, filename, content_type);
        match self.accounting.record_upload(&upload).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if wrote_blob {
                    self.discard_orphan_blob(&hash).await;
                }
                Err(e)
            }
        }
    }

    /// Download a file by reference ID.
    pub async fn download(&self, reference_id: &str) -> Result<DownloadResult> {
        let reference = self.accounting.get_reference(reference_id).await?;
        let content = self.storage.load(&reference.hash)?;

        Ok(DownloadResult { reference, content })
    }

    /// Delete a file reference.
    ///
    /// The blob is removed from disk together with the last reference to it.
    pub async fn delete(&self, reference_id: &str) -> Result<DeleteOutcome> {
        let reference = self.accounting.get_reference(reference_id).await?;
        let _guard = self.locks.lock(&reference.hash).await;

        let outcome = self.accounting.record_delete(reference_id).await?;
        if outcome.stored_file_removed {
            if let Err(e) = self.storage.delete(&outcome.reference.hash) {
                warn!(
                    hash = %outcome.reference.hash,
                    error = %e,
                    "Failed to remove blob of deleted file"
                );
            } else {
                info!(hash = %outcome.reference.hash, "Removed blob");
            }
        }

        Ok(outcome)
    }

    /// Remove empty shard directories left behind by deletes.
    pub async fn cleanup_storage(&self) -> Result<usize> {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.cleanup_empty_dirs())
            .await
            .map_err(|e| VaultError::Io(std::io::Error::other(e)))?
    }

    /// Check that every stored file has a blob of the recorded size.
    ///
    /// Returns the hashes whose blob is missing or has the wrong size. Each
    /// one is logged; nothing is repaired.
    pub async fn verify_blobs(&self) -> Result<Vec<String>> {
        let expected: Vec<(String, i64)> = self
            .accounting
            .list_stored_files()
            .await?
            .into_iter()
            .map(|stored| (stored.hash, stored.size))
            .collect();

        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || {
            let mut damaged = Vec::new();
            for (hash, size) in expected {
                match storage.blob_size(&hash) {
                    Ok(actual) if i64::try_from(actual).ok() == Some(size) => {}
                    Ok(actual) => {
                        warn!(hash = %hash, expected = size, actual, "Blob size mismatch");
                        damaged.push(hash);
                    }
                    Err(VaultError::NotFound(_)) => {
                        warn!(hash = %hash, "Blob missing for stored file");
                        damaged.push(hash);
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(damaged)
        })
        .await
        .map_err(|e| VaultError::Io(std::io::Error::other(e)))?
    }

    fn validate_filename(&self, filename: &str) -> Result<()> {
        if filename.is_empty() {
            return Err(VaultError::Validation("filename is empty".to_string()));
        }
        if filename.chars().count() > MAX_FILENAME_LENGTH {
            return Err(VaultError::Validation(format!(
                "filename is too long (max {MAX_FILENAME_LENGTH} characters)"
            )));
        }
        if !self.allowed_extensions.is_empty() {
            let extension = extension_of(filename).unwrap_or_default();
            if !self.allowed_extensions.contains(&extension) {
                return Err(VaultError::Validation(format!(
                    "file type not allowed (allowed: {})",
                    self.allowed_extensions.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Drop a blob written for an upload that accounting rejected, unless a
    /// concurrent upload has since claimed it.
    async fn discard_orphan_blob(&self, hash: &str) {
        match self.accounting.get_stored_file(hash).await {
            Ok(None) => {
                if let Err(e) = self.storage.delete(hash) {
                    warn!(hash, error = %e, "Failed to discard orphan blob");
                }
            }
            Ok(Some(_)) => {}
            Err(e) => warn!(hash, error = %e, "Could not check orphan blob"),
        }
    }
}

/// Lowercase extension of `filename`, without the dot.
fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
}

/// Content type inferred from the filename's extension.
fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}
