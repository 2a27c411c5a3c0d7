//! Response DTOs for the dedupvault HTTP API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::accounting::{FileReference, Page, StorageMetadata};
use crate::datetime::to_rfc3339;

/// A file reference as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileResponse {
    /// Reference ID.
    pub id: String,
    /// Download locator for the content.
    pub file: String,
    /// Filename of the upload.
    pub original_filename: String,
    /// Content type of the upload.
    pub file_type: String,
    /// Size in bytes.
    pub size: i64,
    /// Upload time (RFC3339).
    pub uploaded_at: String,
}

impl From<FileReference> for FileResponse {
    fn from(reference: FileReference) -> Self {
        Self {
            file: reference.download_path(),
            uploaded_at: to_rfc3339(&reference.created_at),
            id: reference.id,
            original_filename: reference.original_filename,
            file_type: reference.file_type,
            size: reference.size,
        }
    }
}

/// One page of file references.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileListResponse {
    /// References on this page, newest first.
    pub results: Vec<FileResponse>,
    /// Number of references matching the filter.
    pub total: i64,
    /// Number of pages.
    pub pages: i64,
    /// Current page number.
    pub current_page: u32,
}

impl From<Page<FileReference>> for FileListResponse {
    fn from(page: Page<FileReference>) -> Self {
        Self {
            total: page.total,
            pages: page.pages(),
            current_page: page.page,
            results: page.items.into_iter().map(FileResponse::from).collect(),
        }
    }
}

/// Storage accounting figures.
#[derive(Debug, Serialize, ToSchema)]
pub struct StorageMetadataResponse {
    /// Number of file references.
    pub total_files_referenced: i64,
    /// Number of unique stored files.
    pub unique_files_stored: i64,
    /// References that did not need their own copy.
    pub duplicates_prevented: i64,
    /// Bytes saved by deduplication.
    pub storage_saved_bytes: i64,
    /// Bytes saved by deduplication, in MiB.
    pub storage_saved_mb: f64,
}

impl From<StorageMetadata> for StorageMetadataResponse {
    fn from(metadata: StorageMetadata) -> Self {
        Self {
            total_files_referenced: metadata.total_files_referenced,
            unique_files_stored: metadata.unique_files_stored,
            duplicates_prevented: metadata.duplicates_prevented(),
            storage_saved_bytes: metadata.storage_saved_bytes,
            storage_saved_mb: metadata.storage_saved_mb(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> FileReference {
        FileReference {
            seq: 1,
            id: "abc".to_string(),
            original_filename: "a.pdf".to_string(),
            file_type: "application/pdf".to_string(),
            hash: "h1".to_string(),
            size: 1000,
            created_at: "2024-01-15 10:30:00.000000".to_string(),
        }
    }

    #[test]
    fn test_file_response_from_reference() {
        let response = FileResponse::from(reference());
        assert_eq!(response.id, "abc");
        assert_eq!(response.file, "/api/files/abc/download");
        assert_eq!(response.uploaded_at, "2024-01-15T10:30:00.000000Z");
    }

    #[test]
    fn test_file_list_response() {
        let page = Page {
            items: vec![reference()],
            total: 6,
            page: 2,
            page_size: 5,
        };
        let response = FileListResponse::from(page);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.pages, 2);
        assert_eq!(response.current_page, 2);
    }

    #[test]
    fn test_metadata_response() {
        let response = StorageMetadataResponse::from(StorageMetadata {
            total_files_referenced: 3,
            unique_files_stored: 1,
            storage_saved_bytes: 3 * 1_048_576 / 2,
        });
        assert_eq!(response.duplicates_prevented, 2);
        assert_eq!(response.storage_saved_mb, 1.5);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["storage_saved_bytes"], 1_572_864);
    }
}
