//! Entity types for deduplicated storage accounting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::datetime::parse_db_datetime;
use crate::{Result, VaultError};

/// Number of bytes in one reported megabyte.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Maximum length for an original filename (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length for a content-type label (in characters).
pub const MAX_CONTENT_TYPE_LENGTH: usize = 100;

/// Maximum length for a content hash (in characters).
pub const MAX_HASH_LENGTH: usize = 128;

/// The unique, deduplicated physical content entry keyed by content hash.
///
/// A stored file exists only while at least one [`FileReference`] points at it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredFile {
    /// Content hash (unique key).
    pub hash: String,
    /// Content size in bytes.
    pub size: i64,
    /// Number of file references sharing this content.
    pub reference_count: i64,
    /// When the content was first stored.
    pub stored_at: String,
}

impl StoredFile {
    /// Bytes not re-stored thanks to deduplication of this content.
    pub fn saved_bytes(&self) -> i64 {
        self.size * (self.reference_count - 1).max(0)
    }
}

/// A logical upload pointing at a [`StoredFile`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FileReference {
    /// Insertion sequence, used to break ties between equal timestamps.
    pub seq: i64,
    /// Unique reference ID (UUID).
    pub id: String,
    /// Filename of the originating upload.
    pub original_filename: String,
    /// Content-type label of the originating upload.
    pub file_type: String,
    /// Hash of the stored content.
    pub hash: String,
    /// Size of the stored content in bytes.
    pub size: i64,
    /// When the reference was created.
    pub created_at: String,
}

impl FileReference {
    /// Get the created_at as `DateTime<Utc>`.
    pub fn created_at_datetime(&self) -> Option<DateTime<Utc>> {
        parse_db_datetime(&self.created_at)
    }

    /// Locator the content of this reference can be downloaded from.
    pub fn download_path(&self) -> String {
        format!("/api/files/{}/download", self.id)
    }
}

/// Data for registering an upload.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// Content hash supplied by the hashing collaborator.
    pub content_hash: String,
    /// Content size in bytes.
    pub size: i64,
    /// Original filename.
    pub filename: String,
    /// Content-type label.
    pub content_type: String,
    /// Upload timestamp; defaults to now.
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl NewUpload {
    /// Create a new upload record.
    pub fn new(
        content_hash: impl Into<String>,
        size: i64,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            size,
            filename: filename.into(),
            content_type: content_type.into(),
            uploaded_at: None,
        }
    }

    /// Set an explicit upload timestamp.
    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = Some(uploaded_at);
        self
    }

    /// Check the record is well-formed before it reaches the database.
    pub fn validate(&self) -> Result<()> {
        let hash = self.content_hash.trim();
        if hash.is_empty() {
            return Err(VaultError::Validation("content hash is empty".to_string()));
        }
        if hash.chars().count() > MAX_HASH_LENGTH {
            return Err(VaultError::Validation(format!(
                "content hash exceeds {MAX_HASH_LENGTH} characters"
            )));
        }
        if self.size < 0 {
            return Err(VaultError::Validation(format!(
                "size must not be negative (got {})",
                self.size
            )));
        }
        if self.filename.trim().is_empty() {
            return Err(VaultError::Validation("filename is empty".to_string()));
        }
        if self.filename.chars().count() > MAX_FILENAME_LENGTH {
            return Err(VaultError::Validation(format!(
                "filename is too long (max {MAX_FILENAME_LENGTH} characters)"
            )));
        }
        if self.content_type.chars().count() > MAX_CONTENT_TYPE_LENGTH {
            return Err(VaultError::Validation(format!(
                "content type is too long (max {MAX_CONTENT_TYPE_LENGTH} characters)"
            )));
        }
        Ok(())
    }
}

/// Point-in-time storage accounting figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, sqlx::FromRow)]
pub struct StorageMetadata {
    /// Number of file references.
    pub total_files_referenced: i64,
    /// Number of unique stored files.
    pub unique_files_stored: i64,
    /// Sum over stored files of `size * (reference_count - 1)`.
    pub storage_saved_bytes: i64,
}

impl StorageMetadata {
    /// References that did not need their own physical copy.
    pub fn duplicates_prevented(&self) -> i64 {
        self.total_files_referenced - self.unique_files_stored
    }

    /// Saved bytes expressed in MiB.
    pub fn storage_saved_mb(&self) -> f64 {
        self.storage_saved_bytes as f64 / BYTES_PER_MB
    }
}

/// Result of a successful [`record_upload`](super::StorageAccounting::record_upload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The newly created reference.
    pub reference: FileReference,
    /// The stored file after the upload.
    pub stored_file: StoredFile,
    /// Whether the content was already stored.
    pub deduplicated: bool,
}

/// Result of a successful [`record_delete`](super::StorageAccounting::record_delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// The reference that was removed.
    pub reference: FileReference,
    /// Whether the last reference was removed and the stored file with it.
    pub stored_file_removed: bool,
}
