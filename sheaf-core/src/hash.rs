//! Content hashing

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// First `len` characters of a hex hash
pub fn short_hash(hash: &str, len: usize) -> &str {
    &hash[..len.min(hash.len())]
}
