//! Cache key generation for named cache entries.

use sha2::{Digest, Sha256};

/// Compute the storage key for `url` inside the cache called `cache_name`.
///
/// The same URL in two caches yields two distinct keys, so caches never share rows.
pub fn compute_cache_key(cache_name: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cache_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
