//! Directory-listing cache invalidation.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Cache of server directory listings, keyed by directory path.
///
/// A finished session invalidates its destination so the next listing
/// shows the uploaded files.
pub trait ListingCache: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Listing validators (ETags) by directory path.
///
/// A client sends the stored ETag as `If-None-Match` when it lists a
/// directory; dropping the entry forces a fresh listing.
#[derive(Debug, Default)]
pub struct EtagCache {
    etags: Mutex<HashMap<String, String>>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.etags.lock().ok()?.get(path).cloned()
    }

    pub fn set(&self, path: impl Into<String>, etag: impl Into<String>) {
        if let Ok(mut etags) = self.etags.lock() {
            etags.insert(path.into(), etag.into());
        }
    }

    pub fn len(&self) -> usize {
        self.etags.lock().map(|etags| etags.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListingCache for EtagCache {
    fn invalidate(&self, path: &str) {
        if let Ok(mut etags) = self.etags.lock() {
            if etags.remove(path).is_some() {
                debug!(path, "listing invalidated");
            }
        }
    }
}

/// For callers without a listing cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ListingCache for NoopCache {
    fn invalidate(&self, _path: &str) {}
}
