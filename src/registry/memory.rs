//! In-process registry.
//!
//! Implements the whole [`RegistryClient`] contract against in-memory state:
//! global ids and content ids are assigned from 1, identical content shares
//! one content id, and versions count up from `"1"` per artifact. It keeps
//! per-operation call counts and can be switched offline, which makes it the
//! registry used by embedded pipelines and by the resolver's tests.
//!
//! Dereferenced fetches return the stored content unchanged; inlining
//! references is left to real registries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use super::{CreateArtifact, RegistryClient, RegistryResult};
use crate::artifact::{ArtifactMetadata, IfExists, ReferenceDescriptor};
use crate::checksum::Checksum;
use crate::error::RegistryError;

/// Number of calls received per operation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistryCalls {
    pub create_artifact: u64,
    pub artifact_metadata: u64,
    pub version_metadata: u64,
    pub metadata_by_content: u64,
    pub content_by_id: u64,
    pub content_by_hash: u64,
    pub content_by_global_id: u64,
    pub references: u64,
}

impl RegistryCalls {
    pub fn total(&self) -> u64 {
        self.create_artifact
            + self.artifact_metadata
            + self.version_metadata
            + self.metadata_by_content
            + self.content_by_id
            + self.content_by_hash
            + self.content_by_global_id
            + self.references
    }
}

struct StoredContent {
    content: Vec<u8>,
    hash: Checksum,
    canonical: Checksum,
    references: Vec<ReferenceDescriptor>,
}

type ArtifactKey = (Option<String>, String);

#[derive(Default)]
struct State {
    /// Index `i` holds content id `i + 1`
    contents: Vec<StoredContent>,
    content_ids: HashMap<Checksum, i64>,
    /// Index `i` holds global id `i + 1`
    versions: Vec<ArtifactMetadata>,
    /// Global ids of each artifact's versions, oldest first
    artifacts: HashMap<ArtifactKey, Vec<i64>>,
}

impl State {
    fn content(&self, content_id: i64) -> RegistryResult<&StoredContent> {
        content_id
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.contents.get(index))
            .ok_or_else(|| RegistryError::NotFound(format!("content id {content_id}")))
    }

    fn version(&self, global_id: i64) -> RegistryResult<&ArtifactMetadata> {
        global_id
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .and_then(|index| self.versions.get(index))
            .ok_or_else(|| RegistryError::NotFound(format!("global id {global_id}")))
    }

    fn content_id_by_hash(&self, content_hash: &str) -> RegistryResult<i64> {
        self.content_ids
            .get(&Checksum::from(content_hash))
            .copied()
            .ok_or_else(|| RegistryError::NotFound(format!("content hash {content_hash}")))
    }

    fn artifact_versions(&self, group_id: Option<&str>, artifact_id: &str) -> RegistryResult<&[i64]> {
        self.artifacts
            .get(&(group_id.map(str::to_string), artifact_id.to_string()))
            .map(Vec::as_slice)
            .filter(|versions| !versions.is_empty())
            .ok_or_else(|| RegistryError::NotFound(format!("artifact {artifact_id}")))
    }

    fn latest(&self, group_id: Option<&str>, artifact_id: &str) -> RegistryResult<&ArtifactMetadata> {
        let versions = self.artifact_versions(group_id, artifact_id)?;
        match versions.last() {
            Some(global_id) => self.version(*global_id),
            None => Err(RegistryError::NotFound(format!("artifact {artifact_id}"))),
        }
    }

    fn find_version(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        version: &str,
    ) -> RegistryResult<&ArtifactMetadata> {
        for global_id in self.artifact_versions(group_id, artifact_id)? {
            let metadata = self.version(*global_id)?;
            if metadata.version == version {
                return Ok(metadata);
            }
        }
        Err(RegistryError::NotFound(format!("artifact {artifact_id} version {version}")))
    }

    fn intern_content(&mut self, content: &[u8], references: &[ReferenceDescriptor]) -> i64 {
        let hash = Checksum::from_bytes(content);
        if let Some(content_id) = self.content_ids.get(&hash) {
            return *content_id;
        }
        self.contents.push(StoredContent {
            content: content.to_vec(),
            hash: hash.clone(),
            canonical: Checksum::canonical(content),
            references: references.to_vec(),
        });
        let content_id = self.contents.len() as i64;
        self.content_ids.insert(hash, content_id);
        content_id
    }

    fn matches(&self, metadata: &ArtifactMetadata, content: &[u8], canonical: bool) -> bool {
        match self.content(metadata.content_id) {
            Ok(stored) if canonical => stored.canonical == Checksum::canonical(content),
            Ok(stored) => stored.hash.verify(content),
            Err(_) => false,
        }
    }

    fn add_version(&mut self, request: &CreateArtifact<'_>) -> RegistryResult<ArtifactMetadata> {
        for reference in request.references {
            let exists = match reference.version.as_deref() {
                Some(version) => {
                    self.find_version(reference.group_id.as_deref(), &reference.artifact_id, version)
                }
                None => self.latest(reference.group_id.as_deref(), &reference.artifact_id),
            };
            if exists.is_err() {
                return Err(RegistryError::NotFound(format!(
                    "referenced artifact {} does not exist",
                    reference.artifact_id
                )));
            }
        }

        let key = (request.group_id.map(str::to_string), request.artifact_id.to_string());
        let existing = self.artifacts.get(&key).map(Vec::len).unwrap_or(0);
        let version = match request.version {
            Some(version) => {
                if self
                    .find_version(request.group_id, request.artifact_id, version)
                    .is_ok()
                {
                    return Err(RegistryError::Conflict(format!(
                        "{} version {version}",
                        request.artifact_id
                    )));
                }
                version.to_string()
            }
            None => (existing + 1).to_string(),
        };

        let content_id = self.intern_content(request.content, request.references);
        let content_hash = self.content(content_id)?.hash.to_string();
        let global_id = self.versions.len() as i64 + 1;
        let metadata = ArtifactMetadata {
            group_id: request.group_id.map(str::to_string),
            artifact_id: request.artifact_id.to_string(),
            version,
            global_id,
            content_id,
            content_hash: Some(content_hash),
            artifact_type: request.artifact_type,
            created_on: Some(Utc::now()),
        };
        self.versions.push(metadata.clone());
        self.artifacts.entry(key).or_default().push(global_id);
        Ok(metadata)
    }
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
    calls: Mutex<RegistryCalls>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call counters
    pub fn calls(&self) -> RegistryCalls {
        *self.calls.lock()
    }

    /// Make every subsequent call fail with [`RegistryError::Unavailable`]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every call by `latency`, as a remote registry would
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of artifact versions stored
    pub fn version_count(&self) -> usize {
        self.state.lock().versions.len()
    }

    /// Version strings of an artifact, oldest first
    pub fn list_versions(&self, group_id: Option<&str>, artifact_id: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .artifact_versions(group_id, artifact_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.version(*id).ok())
                    .map(|metadata| metadata.version.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn enter(&self, count: impl FnOnce(&mut RegistryCalls)) -> RegistryResult<()> {
        count(&mut *self.calls.lock());
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("registry is offline".to_string()));
        }
        Ok(())
    }
}

impl RegistryClient for InMemoryRegistry {
    fn create_artifact(&self, request: &CreateArtifact<'_>) -> RegistryResult<ArtifactMetadata> {
        self.enter(|calls| calls.create_artifact += 1)?;
        let mut state = self.state.lock();

        let latest = state.latest(request.group_id, request.artifact_id).ok().cloned();
        match (latest, request.if_exists) {
            (None, _) | (Some(_), IfExists::Update) => state.add_version(request),
            (Some(_), IfExists::Fail) => Err(RegistryError::Conflict(request.artifact_id.to_string())),
            (Some(latest), IfExists::Return) => Ok(latest),
            (Some(latest), IfExists::ReturnOrUpdate) => {
                if state.matches(&latest, request.content, request.canonical) {
                    Ok(latest)
                } else {
                    state.add_version(request)
                }
            }
        }
    }

    fn get_artifact_metadata(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
    ) -> RegistryResult<ArtifactMetadata> {
        self.enter(|calls| calls.artifact_metadata += 1)?;
        self.state.lock().latest(group_id, artifact_id).cloned()
    }

    fn get_artifact_version_metadata(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        version: &str,
    ) -> RegistryResult<ArtifactMetadata> {
        self.enter(|calls| calls.version_metadata += 1)?;
        self.state
            .lock()
            .find_version(group_id, artifact_id, version)
            .cloned()
    }

    fn get_artifact_version_metadata_by_content(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        canonical: bool,
        content: &[u8],
    ) -> RegistryResult<ArtifactMetadata> {
        self.enter(|calls| calls.metadata_by_content += 1)?;
        let state = self.state.lock();
        for global_id in state.artifact_versions(group_id, artifact_id)?.iter().rev() {
            let metadata = state.version(*global_id)?;
            if state.matches(metadata, content, canonical) {
                return Ok(metadata.clone());
            }
        }
        Err(RegistryError::NotFound(format!(
            "no version of {artifact_id} with matching content"
        )))
    }

    fn get_content_by_id(&self, content_id: i64) -> RegistryResult<Vec<u8>> {
        self.enter(|calls| calls.content_by_id += 1)?;
        Ok(self.state.lock().content(content_id)?.content.clone())
    }

    fn get_content_by_hash(&self, content_hash: &str) -> RegistryResult<Vec<u8>> {
        self.enter(|calls| calls.content_by_hash += 1)?;
        let state = self.state.lock();
        let content_id = state.content_id_by_hash(content_hash)?;
        Ok(state.content(content_id)?.content.clone())
    }

    fn get_content_by_global_id(&self, global_id: i64, _dereference: bool) -> RegistryResult<Vec<u8>> {
        self.enter(|calls| calls.content_by_global_id += 1)?;
        let state = self.state.lock();
        let content_id = state.version(global_id)?.content_id;
        Ok(state.content(content_id)?.content.clone())
    }

    fn get_artifact_references_by_content_id(
        &self,
        content_id: i64,
    ) -> RegistryResult<Vec<ReferenceDescriptor>> {
        self.enter(|calls| calls.references += 1)?;
        Ok(self.state.lock().content(content_id)?.references.clone())
    }

    fn get_artifact_references_by_content_hash(
        &self,
        content_hash: &str,
    ) -> RegistryResult<Vec<ReferenceDescriptor>> {
        self.enter(|calls| calls.references += 1)?;
        let state = self.state.lock();
        let content_id = state.content_id_by_hash(content_hash)?;
        Ok(state.content(content_id)?.references.clone())
    }

    fn get_artifact_references_by_global_id(
        &self,
        global_id: i64,
    ) -> RegistryResult<Vec<ReferenceDescriptor>> {
        self.enter(|calls| calls.references += 1)?;
        let state = self.state.lock();
        let content_id = state.version(global_id)?.content_id;
        Ok(state.content(content_id)?.references.clone())
    }
}
