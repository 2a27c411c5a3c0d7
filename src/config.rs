//! Configuration module for dedupvault.

use serde::Deserialize;
use std::path::Path;

use crate::{Result, VaultError};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/dedupvault.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    /// Path to the blob storage directory.
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
    /// Allowed filename extensions (lowercase, without dot).
    ///
    /// Defaults to pdf, png, jpg and jpeg. An explicit empty list allows
    /// every extension.
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_storage_path() -> String {
    "data/blobs".to_string()
}

fn default_max_upload_size() -> u64 {
    10
}

fn default_allowed_extensions() -> Vec<String> {
    ["pdf", "png", "jpg", "jpeg"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl FilesConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            max_upload_size_mb: default_max_upload_size(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Listing pagination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when the client does not ask for one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    /// Largest page size a client may request.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_page_size() -> u32 {
    5
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/dedupvault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// File storage configuration.
    #[serde(default)]
    pub files: FilesConfig,
    /// Listing pagination configuration.
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `DEDUPVAULT_DATABASE_PATH`: Override the database file path
    /// - `DEDUPVAULT_STORAGE_PATH`: Override the blob storage directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DEDUPVAULT_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(path) = std::env::var("DEDUPVAULT_STORAGE_PATH") {
            if !path.is_empty() {
                self.files.storage_path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.files.max_upload_size_mb == 0 {
            return Err(VaultError::Config(
                "files.max_upload_size_mb must be greater than zero".to_string(),
            ));
        }
        if self.pagination.default_page_size == 0 || self.pagination.max_page_size == 0 {
            return Err(VaultError::Config(
                "pagination sizes must be greater than zero".to_string(),
            ));
        }
        if self.pagination.default_page_size > self.pagination.max_page_size {
            return Err(VaultError::Config(
                "pagination.default_page_size exceeds pagination.max_page_size".to_string(),
            ));
        }
        if self.pagination.max_page_size > crate::accounting::MAX_PAGE_SIZE {
            return Err(VaultError::Config(format!(
                "pagination.max_page_size must not exceed {}",
                crate::accounting::MAX_PAGE_SIZE
            )));
        }
        if self.database.max_connections == 0 {
            return Err(VaultError::Config(
                "database.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
