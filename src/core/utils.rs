//! Utility functions for fnord
//!
//! Hashing, identifiers and timestamps shared by the stores.

use sha2::{Digest, Sha256};

/// Generate a random UUID (v4) for facts and conversations
pub fn generate_uuid() -> uuid::Uuid {
    uuid::Uuid::new_v4()
}

/// Calculate BLAKE3 hash of content
pub fn hash_content(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    hash.to_hex().to_string()
}

/// Short BLAKE3 prefix used for on-disk file and directory names
pub fn short_hash(content: &[u8]) -> String {
    let mut hex = hash_content(content);
    hex.truncate(16);
    hex
}

/// SHA-256 hex digest, used for conversation summary hashes
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current time as an RFC 3339 string
///
/// Fixed microsecond precision in UTC, so timestamps sort lexically.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
