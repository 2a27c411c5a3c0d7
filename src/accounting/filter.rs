//! Listing filter and pagination types.

use chrono::NaiveDate;

use crate::{Result, VaultError};

/// Default number of references per page.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Hard upper bound on page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Maximum length for the filename search term (in characters).
pub const MAX_SEARCH_LENGTH: usize = 255;

/// Criteria for listing file references.
///
/// All criteria are optional and combine with AND. Results are always
/// ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFilter {
    /// Case-insensitive substring of the original filename.
    pub search: Option<String>,
    /// Exact content-type label.
    pub file_type: Option<String>,
    /// Minimum size in bytes (inclusive).
    pub min_size: Option<i64>,
    /// Maximum size in bytes (inclusive).
    pub max_size: Option<i64>,
    /// Single upload day (UTC).
    pub upload_date: Option<NaiveDate>,
    /// First upload day of a range (inclusive, UTC).
    pub uploaded_from: Option<NaiveDate>,
    /// Last upload day of a range (inclusive, UTC).
    pub uploaded_to: Option<NaiveDate>,
    /// 1-based page number.
    pub page: u32,
    /// Number of references per page.
    pub page_size: u32,
}

impl Default for ReferenceFilter {
    fn default() -> Self {
        Self {
            search: None,
            file_type: None,
            min_size: None,
            max_size: None,
            upload_date: None,
            uploaded_from: None,
            uploaded_to: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ReferenceFilter {
    /// Create a filter matching everything, first page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by filename substring.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Filter by exact content type.
    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    /// Filter by minimum size.
    pub fn with_min_size(mut self, min_size: i64) -> Self {
        self.min_size = Some(min_size);
        self
    }

    /// Filter by maximum size.
    pub fn with_max_size(mut self, max_size: i64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Filter by an inclusive size range.
    pub fn with_size_range(self, min_size: i64, max_size: i64) -> Self {
        self.with_min_size(min_size).with_max_size(max_size)
    }

    /// Filter by a single upload day.
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.upload_date = Some(date);
        self
    }

    /// Filter by an inclusive range of upload days.
    pub fn uploaded_between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.uploaded_from = Some(from);
        self.uploaded_to = Some(to);
        self
    }

    /// Select a page.
    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Search term with surrounding whitespace removed, if non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Content type with surrounding whitespace removed, if non-empty.
    pub fn file_type_term(&self) -> Option<&str> {
        self.file_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Number of references to skip.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }

    /// Reject malformed filters before any query runs.
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_size {
            if min < 0 {
                return Err(VaultError::Validation(format!(
                    "min_size must not be negative (got {min})"
                )));
            }
        }
        if let Some(max) = self.max_size {
            if max < 0 {
                return Err(VaultError::Validation(format!(
                    "max_size must not be negative (got {max})"
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(VaultError::Validation(format!(
                    "min_size ({min}) exceeds max_size ({max})"
                )));
            }
        }
        if let (Some(from), Some(to)) = (self.uploaded_from, self.uploaded_to) {
            if from > to {
                return Err(VaultError::Validation(format!(
                    "uploaded_from ({from}) is after uploaded_to ({to})"
                )));
            }
        }
        if let Some(search) = &self.search {
            if search.chars().count() > MAX_SEARCH_LENGTH {
                return Err(VaultError::Validation(format!(
                    "search term exceeds {MAX_SEARCH_LENGTH} characters"
                )));
            }
        }
        if self.page == 0 {
            return Err(VaultError::Validation("page starts at 1".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(VaultError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Number of items matching the filter across all pages.
    pub total: i64,
    /// 1-based page number.
    pub page: u32,
    /// Page size used for this query.
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Number of pages; an empty listing still has one (empty) page.
    pub fn pages(&self) -> i64 {
        if self.total <= 0 || self.page_size == 0 {
            return 1;
        }
        let size = i64::from(self.page_size);
        (self.total + size - 1) / size
    }

    /// Whether a later page has items.
    pub fn has_next(&self) -> bool {
        i64::from(self.page) < self.pages()
    }
}
