//! Validation utilities for HTTP API DTOs.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A query-string extractor that validates the parameters.
///
/// Deserializes the query string and then validates it using the
/// `validator` crate. Malformed values are a bad request; values that parse
/// but fail validation return field-level error details.
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid query: {}", e)))?;

        value.validate().map_err(ApiError::from_validation_errors)?;

        Ok(ValidatedQuery(value))
    }
}

// ============================================================================
// Custom Validators
// ============================================================================

/// Validate that a string does not contain control characters or NULL bytes.
pub fn no_control_chars(value: &str) -> Result<(), validator::ValidationError> {
    if value.chars().any(|c| c.is_control()) {
        return Err(validator::ValidationError::new("no_control_chars")
            .with_message("Must not contain control characters".into()));
    }
    Ok(())
}

/// Strip path components and control characters from a client filename.
///
/// Browsers may send `C:\fakepath\name.pdf` or similar; only the final
/// component is kept.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_control_chars_valid() {
        assert!(no_control_chars("Hello, world!").is_ok());
        assert!(no_control_chars("report 2024.pdf").is_ok());
    }

    #[test]
    fn test_no_control_chars_invalid() {
        assert!(no_control_chars("Hello\x00World").is_err()); // NULL byte
        assert!(no_control_chars("Hello\x07World").is_err()); // Bell
        assert!(no_control_chars("Line\nbreak").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("C:\\fakepath\\report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(" a\x00b.txt "), "ab.txt");
        assert_eq!(sanitize_filename("dir/"), "");
    }
}
