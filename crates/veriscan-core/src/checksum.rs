//! Content checksums.
//!
//! Uploaded bytes are identified by their SHA-256 digest. The clean store is
//! keyed by this digest, which is what makes promotion write-once per content.

use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
