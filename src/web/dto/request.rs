//! Request DTOs for the dedupvault HTTP API.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::accounting::ReferenceFilter;
use crate::datetime::parse_date;
use crate::Result;

use super::validation::no_control_chars;

/// Query parameters for listing files.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListFilesQuery {
    /// Case-insensitive substring of the original filename.
    #[validate(
        length(max = 255, message = "Search term is too long"),
        custom(function = "no_control_chars")
    )]
    pub search: Option<String>,
    /// Exact content type, e.g. `application/pdf`.
    #[validate(length(max = 100, message = "File type is too long"))]
    pub file_type: Option<String>,
    /// Minimum size in bytes (inclusive).
    #[validate(range(min = 0, message = "Must not be negative"))]
    pub min_size: Option<i64>,
    /// Maximum size in bytes (inclusive).
    #[validate(range(min = 0, message = "Must not be negative"))]
    pub max_size: Option<i64>,
    /// Upload day, `YYYY-MM-DD` (UTC).
    pub upload_date: Option<String>,
    /// First upload day, `YYYY-MM-DD` (inclusive).
    pub uploaded_from: Option<String>,
    /// Last upload day, `YYYY-MM-DD` (inclusive).
    pub uploaded_to: Option<String>,
    /// Page number (1-based).
    #[validate(range(min = 1, message = "Page starts at 1"))]
    pub page: Option<u32>,
    /// Items per page.
    #[validate(range(min = 1, message = "Page size must be positive"))]
    pub page_size: Option<u32>,
}

/// Multipart form accepted by the upload endpoint.
///
/// Only describes the request for the OpenAPI document; the handler reads
/// the multipart stream directly.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// File content.
    #[schema(format = Binary)]
    pub file: String,
}

impl ListFilesQuery {
    /// Build a listing filter, filling pagination defaults.
    ///
    /// `page_size` is capped at `max_page_size`.
    pub fn into_filter(
        self,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Result<ReferenceFilter> {
        let filter = ReferenceFilter {
            search: self.search,
            file_type: self.file_type,
            min_size: self.min_size,
            max_size: self.max_size,
            upload_date: parse_optional_date(self.upload_date.as_deref())?,
            uploaded_from: parse_optional_date(self.uploaded_from.as_deref())?,
            uploaded_to: parse_optional_date(self.uploaded_to.as_deref())?,
            page: self.page.unwrap_or(1),
            page_size: self
                .page_size
                .unwrap_or(default_page_size)
                .min(max_page_size),
        };
        filter.validate()?;
        Ok(filter)
    }
}

fn parse_optional_date(value: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_date(v).map(Some),
        None => Ok(None),
    }
}
