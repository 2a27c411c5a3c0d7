//! Deduplicated storage accounting for dedupvault.
//!
//! Tracks which content is physically stored, how many uploads refer to it,
//! and how much space deduplication saves.

mod events;
mod filter;
mod repository;
mod service;
mod types;

pub use events::{StorageEvent, EVENT_CHANNEL_CAPACITY};
pub use filter::{Page, ReferenceFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SEARCH_LENGTH};
pub use repository::{FileReferenceRepository, StoredFileRepository};
pub use service::StorageAccounting;
pub use types::{
    DeleteOutcome, FileReference, NewUpload, StorageMetadata, StoredFile, UploadOutcome,
    BYTES_PER_MB, MAX_CONTENT_TYPE_LENGTH, MAX_FILENAME_LENGTH, MAX_HASH_LENGTH,
};
