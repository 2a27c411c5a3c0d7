//! File management module for dedupvault.
//!
//! This module provides file upload/download functionality including:
//! - SHA-256 content hashing
//! - Content-addressed blob storage
//! - Upload/download/delete on top of storage accounting

mod hash;
mod locks;
mod service;
mod storage;

pub use hash::{hash_content, HASH_HEX_LENGTH};
pub use locks::{HashGuard, HashLocks};
pub use service::{DownloadResult, FileService, UploadRequest};
pub use storage::BlobStorage;

/// Default maximum file size (10MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
