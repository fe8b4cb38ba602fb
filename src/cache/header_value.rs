//! Bounded LRU memo for values derived from a source key (typically a topic
//! name).
//!
//! Not single-flight: two threads missing on the same key both compute and
//! both write. Derivations stored here are pure, so the second write stores
//! the same value.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Result, SchemaError};

/// Default number of distinct keys kept
pub const DEFAULT_CAPACITY: usize = 100;

pub struct HeaderValueCache {
    inner: Mutex<LruCache<String, String>>,
}

impl HeaderValueCache {
    /// Create a cache holding at most `capacity` keys. Zero is rejected.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            SchemaError::Configuration("header value cache capacity must be > 0".to_string())
        })?;
        Ok(Self {
            inner: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Look up `key`, marking it most recently used on a hit
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    /// Store `value`, evicting the least recently used key when full
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().put(key.into(), value.into());
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

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for HeaderValueCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }
}
