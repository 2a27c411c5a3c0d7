//! dedupvault - Deduplicated file storage
//!
//! Stores each unique content once, counts how many uploads refer to it,
//! and reports how much space deduplication saves. Served over HTTP.

pub mod accounting;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod web;

pub use accounting::{
    DeleteOutcome, FileReference, NewUpload, Page, ReferenceFilter, StorageAccounting,
    StorageEvent, StorageMetadata, StoredFile, UploadOutcome,
};
pub use config::Config;
pub use db::Database;
pub use error::{Result, VaultError};
pub use file::{hash_content, BlobStorage, FileService, UploadRequest};
pub use web::{AppState, WebServer};
