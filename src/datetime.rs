//! Date/time utilities for dedupvault.
//!
//! Timestamps are stored as fixed-width UTC text so that lexical order in
//! SQL matches chronological order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{Result, VaultError};

/// Storage format for timestamps (`2024-01-15 10:30:00.000000`).
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a UTC datetime for storage.
pub fn to_db_string(dt: &DateTime<Utc>) -> String {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

/// Parse a stored timestamp back into a UTC datetime.
pub fn parse_db_datetime(datetime_str: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(datetime_str, DB_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Convert a stored timestamp to RFC3339 for API responses.
///
/// Returns the input unchanged if it cannot be parsed.
pub fn to_rfc3339(datetime_str: &str) -> String {
    match parse_db_datetime(datetime_str) {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        None => datetime_str.to_string(),
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|_| VaultError::Validation(format!("invalid date '{date_str}', expected YYYY-MM-DD")))
}

/// Stored-format timestamp of the first instant of `date`.
pub fn day_start(date: NaiveDate) -> String {
    to_db_string(&date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

/// Stored-format timestamp of the first instant after `date`.
///
/// `None` only for the last representable date.
pub fn day_end_exclusive(date: NaiveDate) -> Option<String> {
    date.succ_opt().map(day_start)
}
