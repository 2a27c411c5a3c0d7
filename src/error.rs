//! Error types for dedupvault.

use thiserror::Error;

/// Common error type for dedupvault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The same content hash was reported with a different byte size than
    /// the stored file already registered under it.
    ///
    /// The upload is rejected and no state is changed.
    #[error("hash collision for {hash}: stored size {existing_size}, reported size {reported_size}")]
    HashCollision {
        /// Content hash that collided.
        hash: String,
        /// Size of the already stored file.
        existing_size: i64,
        /// Size reported by the rejected upload.
        reported_size: i64,
    },

    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

/// Result type alias for dedupvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_collision_display() {
        let err = VaultError::HashCollision {
            hash: "h2".to_string(),
            existing_size: 400,
            reported_size: 500,
        };
        assert_eq!(
            err.to_string(),
            "hash collision for h2: stored size 400, reported size 500"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = VaultError::Validation("min_size exceeds max_size".to_string());
        assert_eq!(
            err.to_string(),
            "validation error: min_size exceeds max_size"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = VaultError::NotFound("file reference".to_string());
        assert_eq!(err.to_string(), "file reference not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "blob missing");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
        assert!(err.to_string().contains("blob missing"));
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: VaultError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, VaultError::Database(_)));
    }

    #[test]
    fn test_result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }

        fn sample_err() -> Result<i32> {
            Err(VaultError::Config("bad".to_string()))
        }

        assert_eq!(sample_ok().unwrap(), 42);
        assert!(sample_err().is_err());
    }
}
