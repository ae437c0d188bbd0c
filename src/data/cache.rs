use std::num::NonZeroUsize;

use lru::LruCache;

/// Upper bound on distinct history endpoints we remember validators for.
const ETAG_CACHE_SIZE: usize = 100;

/// Conditional-request cache for the transaction service.
///
/// Entries are keyed by the full request URL, so two wallets (or the same
/// wallet on two services) never share a validator. A stored ETag is sent as
/// `If-None-Match` on the next fetch of the same URL; a 304 answer means the
/// cached history is still current.
pub struct EtagCache {
    etags: LruCache<String, String>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self {
            etags: LruCache::new(NonZeroUsize::new(ETAG_CACHE_SIZE).unwrap()),
        }
    }

    /// Validator recorded for this URL, if any.
    pub fn get(&mut self, url: &str) -> Option<&str> {
        self.etags.get(url).map(|etag| etag.as_str())
    }

    /// Record the validator returned by a full (200) response.
    pub fn put(&mut self, url: String, etag: String) {
        self.etags.put(url, etag);
    }

    /// Drop the validator for one URL, forcing the next fetch to be full.
    pub fn invalidate(&mut self, url: &str) {
        self.etags.pop(url);
    }

    /// Evict every validator. Useful when switching chains.
    pub fn clear(&mut self) {
        self.etags.clear();
    }
}

impl Default for EtagCache {
    fn default() -> Self {
        Self::new()
    }
}
