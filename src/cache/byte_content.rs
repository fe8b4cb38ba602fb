//! Unbounded memo from raw header bytes to the table id extracted from them.
//!
//! Keys compare by byte content. The number of distinct header payloads in a
//! stream is small next to the message volume, so nothing is evicted.

use dashmap::DashMap;

#[derive(Default)]
pub struct ByteContentCache {
    // `None` records a payload that yielded no table id
    entries: DashMap<Vec<u8>, Option<String>>,
}

impl ByteContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table id for `bytes`.
    ///
    /// Returns `None` both when `bytes` was never seen and when it was seen
    /// but did not contain a table id; use [`ByteContentCache::contains`] to
    /// tell them apart.
    pub fn get(&self, bytes: &[u8]) -> Option<String> {
        self.entries.get(bytes).and_then(|entry| entry.value().clone())
    }

    pub fn contains(&self, bytes: &[u8]) -> bool {
        self.entries.contains_key(bytes)
    }

    pub fn put(&self, bytes: &[u8], table_id: Option<String>) {
        self.entries.insert(bytes.to_vec(), table_id);
    }

    /// Return the cached extraction for `bytes`, running `extract` on a miss.
    pub fn get_or_extract<F>(&self, bytes: &[u8], extract: F) -> Option<String>
    where
        F: FnOnce(&[u8]) -> Option<String>,
    {
        if let Some(entry) = self.entries.get(bytes) {
            return entry.value().clone();
        }
        let table_id = extract(bytes);
        self.entries
            .entry(bytes.to_vec())
            .or_insert(table_id)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
