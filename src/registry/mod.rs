//! Registry client contract.
//!
//! The resolver talks to the schema registry only through
//! [`RegistryClient`]. Calls are blocking; request timeouts and retry policy
//! belong to the implementation.

pub mod memory;

use crate::artifact::{ArtifactMetadata, ArtifactType, IfExists, ReferenceDescriptor};
use crate::error::RegistryError;

pub use memory::{InMemoryRegistry, RegistryCalls};

/// Result type for registry calls
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Everything needed to create (or reuse) an artifact version
#[derive(Debug, Clone)]
pub struct CreateArtifact<'a> {
    pub group_id: Option<&'a str>,
    pub artifact_id: &'a str,
    pub version: Option<&'a str>,
    pub artifact_type: ArtifactType,
    pub if_exists: IfExists,
    pub canonical: bool,
    pub content: &'a [u8],
    /// Artifacts this content depends on; they must already exist
    pub references: &'a [ReferenceDescriptor],
}

pub trait RegistryClient: Send + Sync {
    fn create_artifact(&self, request: &CreateArtifact<'_>) -> RegistryResult<ArtifactMetadata>;

    /// Metadata of the latest version
    fn get_artifact_metadata(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
    ) -> RegistryResult<ArtifactMetadata>;

    fn get_artifact_version_metadata(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        version: &str,
    ) -> RegistryResult<ArtifactMetadata>;

    /// Find the version of an artifact whose content equals `content`
    fn get_artifact_version_metadata_by_content(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        canonical: bool,
        content: &[u8],
    ) -> RegistryResult<ArtifactMetadata>;

    fn get_content_by_id(&self, content_id: i64) -> RegistryResult<Vec<u8>>;

    fn get_content_by_hash(&self, content_hash: &str) -> RegistryResult<Vec<u8>>;

    /// Content of a version; with `dereference` set, nested references are
    /// inlined by the registry.
    fn get_content_by_global_id(&self, global_id: i64, dereference: bool) -> RegistryResult<Vec<u8>>;

    fn get_artifact_references_by_content_id(
        &self,
        content_id: i64,
    ) -> RegistryResult<Vec<ReferenceDescriptor>>;

    fn get_artifact_references_by_content_hash(
        &self,
        content_hash: &str,
    ) -> RegistryResult<Vec<ReferenceDescriptor>>;

    fn get_artifact_references_by_global_id(
        &self,
        global_id: i64,
    ) -> RegistryResult<Vec<ReferenceDescriptor>>;
}
