//! Hashing helpers used to mint stable identifiers.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash each part in order (NUL-separated) and keep the first `len` hex digits.
///
/// The separator keeps `["ab", "c"]` and `["a", "bc"]` distinct.
pub fn short_digest(parts: &[&str], len: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let hex = format!("{:x}", hasher.finalize());
    hex.chars().take(len).collect()
}
