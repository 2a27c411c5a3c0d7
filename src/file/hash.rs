//! Content hashing.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded content hash.
pub const HASH_HEX_LENGTH: usize = 64;

/// Hex-encoded SHA-256 digest of `content`.
pub fn hash_content(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
