//! Multi-key cache of resolved schemas.
//!
//! One result is reachable through up to five key spaces: global id, content
//! id, content hash, coordinates and content key. Whatever key a result is
//! loaded through, it is indexed under every key it carries, so a later
//! lookup by any of them is a hit. Every key space loads single-flight; the
//! content key space is the one that keeps concurrent auto-registrations of
//! the same schema down to a single registry call.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::single_flight::SingleFlight;
use crate::artifact::ArtifactCoordinates;
use crate::error::Result;
use crate::schema::SchemaLookupResult;

/// Shared handle to a cached result
pub type CachedSchema<S> = Arc<SchemaLookupResult<S>>;

/// Key identifying one schema text registered under one artifact id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn new(raw_schema: &[u8], artifact_id: &str) -> Self {
        Self(format!(
            "{}\n__artifact_id={}",
            String::from_utf8_lossy(raw_schema),
            artifact_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct SchemaCache<S> {
    by_global_id: SingleFlight<i64, CachedSchema<S>>,
    by_content_id: SingleFlight<i64, CachedSchema<S>>,
    by_content_hash: SingleFlight<String, CachedSchema<S>>,
    by_coordinates: SingleFlight<ArtifactCoordinates, CachedSchema<S>>,
    by_content: SingleFlight<ContentKey, CachedSchema<S>>,
}

impl<S> Default for SchemaCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SchemaCache<S> {
    pub fn new() -> Self {
        Self {
            by_global_id: SingleFlight::new(),
            by_content_id: SingleFlight::new(),
            by_content_hash: SingleFlight::new(),
            by_coordinates: SingleFlight::new(),
            by_content: SingleFlight::new(),
        }
    }

    pub fn get_by_global_id(&self, global_id: i64) -> Option<CachedSchema<S>> {
        self.by_global_id.get(&global_id)
    }

    pub fn get_by_content_id(&self, content_id: i64) -> Option<CachedSchema<S>> {
        self.by_content_id.get(&content_id)
    }

    pub fn get_by_content_hash(&self, content_hash: &str) -> Option<CachedSchema<S>> {
        self.by_content_hash.get(&content_hash.to_string())
    }

    pub fn get_by_coordinates(&self, coordinates: &ArtifactCoordinates) -> Option<CachedSchema<S>> {
        self.by_coordinates.get(coordinates)
    }

    pub fn get_by_content(&self, key: &ContentKey) -> Option<CachedSchema<S>> {
        self.by_content.get(key)
    }

    pub fn get_or_load_by_global_id<F>(&self, global_id: i64, load: F) -> Result<CachedSchema<S>>
    where
        F: FnOnce() -> Result<SchemaLookupResult<S>>,
    {
        self.by_global_id
            .get_or_try_load(&global_id, || load().map(|result| self.index(result)))
    }

    pub fn get_or_load_by_content_id<F>(&self, content_id: i64, load: F) -> Result<CachedSchema<S>>
    where
        F: FnOnce() -> Result<SchemaLookupResult<S>>,
    {
        self.by_content_id
            .get_or_try_load(&content_id, || load().map(|result| self.index(result)))
    }

    pub fn get_or_load_by_content_hash<F>(
        &self,
        content_hash: &str,
        load: F,
    ) -> Result<CachedSchema<S>>
    where
        F: FnOnce() -> Result<SchemaLookupResult<S>>,
    {
        self.by_content_hash
            .get_or_try_load(&content_hash.to_string(), || {
                load().map(|result| self.index(result))
            })
    }

    pub fn get_or_load_by_coordinates<F>(
        &self,
        coordinates: &ArtifactCoordinates,
        load: F,
    ) -> Result<CachedSchema<S>>
    where
        F: FnOnce() -> Result<SchemaLookupResult<S>>,
    {
        self.by_coordinates
            .get_or_try_load(coordinates, || load().map(|result| self.index(result)))
    }

    /// Store a result loaded outside [`Self::get_or_load_by_coordinates`].
    /// An entry already held for `coordinates` wins and is returned.
    pub fn insert_by_coordinates(
        &self,
        coordinates: ArtifactCoordinates,
        result: SchemaLookupResult<S>,
    ) -> CachedSchema<S> {
        let result = self.index(result);
        self.by_coordinates.insert_if_absent(coordinates, result)
    }

    /// Load through the content key. Concurrent callers with an equal key
    /// wait for the first one and share its result or its error.
    pub fn get_or_load_by_content<F>(&self, key: &ContentKey, load: F) -> Result<CachedSchema<S>>
    where
        F: FnOnce() -> Result<SchemaLookupResult<S>>,
    {
        self.by_content
            .get_or_try_load(key, || load().map(|result| self.index(result)))
    }

    /// Number of distinct content keys held
    pub fn content_len(&self) -> usize {
        self.by_content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_global_id.is_empty()
            && self.by_content_id.is_empty()
            && self.by_content_hash.is_empty()
            && self.by_coordinates.is_empty()
            && self.by_content.is_empty()
    }

    pub fn clear(&self) {
        self.by_global_id.clear();
        self.by_content_id.clear();
        self.by_content_hash.clear();
        self.by_coordinates.clear();
        self.by_content.clear();
    }

    /// Make `result` reachable under every key it carries. Keys that already
    /// hold an entry keep it.
    fn index(&self, result: SchemaLookupResult<S>) -> CachedSchema<S> {
        let result = Arc::new(result);

        if let Some(global_id) = result.global_id {
            self.by_global_id.insert_if_absent(global_id, Arc::clone(&result));
        }
        if let Some(content_id) = result.content_id {
            self.by_content_id.insert_if_absent(content_id, Arc::clone(&result));
        }
        if let Some(content_hash) = &result.content_hash {
            self.by_content_hash
                .insert_if_absent(content_hash.clone(), Arc::clone(&result));
        }
        if let Some(coordinates) = result.coordinates() {
            self.by_coordinates.insert_if_absent(coordinates, Arc::clone(&result));
        }
        if let Some(artifact_id) = result.artifact_id.as_deref() {
            let key = ContentKey::new(result.parsed_schema.raw_schema(), artifact_id);
            self.by_content.insert_if_absent(key, Arc::clone(&result));
        }

        debug!(
            artifact_id = result.artifact_id.as_deref().unwrap_or_default(),
            global_id = result.global_id,
            content_id = result.content_id,
            "indexed schema lookup result"
        );
        result
    }
}
