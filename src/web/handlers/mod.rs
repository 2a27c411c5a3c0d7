//! API handlers for the dedupvault HTTP API.

pub mod file;
pub mod metadata;

pub use file::*;
pub use metadata::*;

use std::sync::Arc;

use crate::accounting::{StorageAccounting, DEFAULT_PAGE_SIZE};
use crate::config::Config;
use crate::db::Database;
use crate::file::FileService;
use crate::Result;

/// Default upper bound on the page size a client may request.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Shared application state.
pub struct AppState {
    /// Storage accounting service.
    pub accounting: Arc<StorageAccounting>,
    /// File service (blobs plus accounting).
    pub files: FileService,
    /// Page size when the client names none.
    pub default_page_size: u32,
    /// Largest page size a client may request.
    pub max_page_size: u32,
}

impl AppState {
    /// Create a new application state with default pagination.
    pub fn new(files: FileService) -> Self {
        Self {
            accounting: Arc::clone(files.accounting()),
            files,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    /// Set pagination limits.
    pub fn with_pagination(mut self, default_page_size: u32, max_page_size: u32) -> Self {
        self.default_page_size = default_page_size;
        self.max_page_size = max_page_size;
        self
    }

    /// Build the state for an opened database from configuration.
    pub fn from_config(db: Database, config: &Config) -> Result<Self> {
        let accounting = Arc::new(StorageAccounting::new(db));
        let files = FileService::from_config(accounting, &config.files)?;
        tracing::info!("File storage initialized at: {}", config.files.storage_path);

        Ok(Self::new(files).with_pagination(
            config.pagination.default_page_size,
            config.pagination.max_page_size,
        ))
    }
}
