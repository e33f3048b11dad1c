use std::num::NonZeroUsize;

use courier_model::EditVersion;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::CoreError;

type CacheKey = (i64, i64);

/// Bounded recency cache used to drop duplicate and stale events.
///
/// Keys are `(source, item)`; the value is the highest edit version seen,
/// `0` meaning the item was never edited.
pub struct DedupCache {
    inner: Mutex<LruCache<CacheKey, EditVersion>>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            CoreError::InvalidConfig("dedup cache capacity must be greater than 0".to_string())
        })?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Read-only lookup; does not refresh recency.
    pub fn has(&self, source: i64, item: i64) -> bool {
        self.inner.lock().contains(&(source, item))
    }

    /// Insert or overwrite, marking the entry most recently used.
    /// Evicts the least recently used entry when full.
    pub fn add(&self, source: i64, item: i64, version: EditVersion) {
        self.inner.lock().put((source, item), version);
    }

    /// Classify an incoming event and record it.
    ///
    /// Returns `(was_known, should_process)`:
    /// * unknown key: `(false, true)`, entry inserted;
    /// * known key with a newer version: `(true, true)`, version raised;
    /// * known key otherwise: `(true, false)`.
    ///
    /// Every call refreshes recency of the key.
    pub fn add_or_update(&self, source: i64, item: i64, version: EditVersion) -> (bool, bool) {
        let mut cache = self.inner.lock();
        if let Some(seen) = cache.get_mut(&(source, item)) {
            if version > *seen {
                *seen = version;
                return (true, true);
            }
            return (true, false);
        }
        cache.put((source, item), version);
        (false, true)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }
}

impl std::fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.inner.lock();
        f.debug_struct("DedupCache")
            .field("len", &cache.len())
            .field("capacity", &cache.cap())
            .finish()
    }
}
