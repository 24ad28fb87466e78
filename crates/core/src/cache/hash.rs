//! Cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a canonical base URL.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
