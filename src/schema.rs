//! Schema values handed out by the resolver

use std::sync::Arc;

use crate::artifact::{ArtifactCoordinates, ArtifactMetadata, ArtifactReference, ReferenceDescriptor};

/// A schema in both its wire form and its parsed, typed form.
///
/// Cloning is cheap: the raw bytes, the parsed value and the references are
/// all shared.
#[derive(Debug)]
pub struct ParsedSchema<S> {
    raw: Arc<[u8]>,
    parsed: Arc<S>,
    references: Vec<Arc<ParsedSchema<S>>>,
    reference_name: Option<String>,
}

impl<S> Clone for ParsedSchema<S> {
    fn clone(&self) -> Self {
        Self {
            raw: Arc::clone(&self.raw),
            parsed: Arc::clone(&self.parsed),
            references: self.references.clone(),
            reference_name: self.reference_name.clone(),
        }
    }
}

impl<S> ParsedSchema<S> {
    pub fn new(raw: impl Into<Arc<[u8]>>, parsed: S) -> Self {
        Self {
            raw: raw.into(),
            parsed: Arc::new(parsed),
            references: Vec::new(),
            reference_name: None,
        }
    }

    /// Attach the schemas this one depends on, in declaration order
    pub fn with_references(mut self, references: Vec<Arc<ParsedSchema<S>>>) -> Self {
        self.references = references;
        self
    }

    /// Name under which a parent schema refers to this one
    pub fn with_reference_name(mut self, name: impl Into<String>) -> Self {
        self.reference_name = Some(name.into());
        self
    }

    /// Wire representation exchanged with the registry
    pub fn raw_schema(&self) -> &[u8] {
        &self.raw
    }

    pub fn parsed(&self) -> &S {
        &self.parsed
    }

    pub fn references(&self) -> &[Arc<ParsedSchema<S>>] {
        &self.references
    }

    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    pub fn reference_name(&self) -> Option<&str> {
        self.reference_name.as_deref()
    }
}

/// Outcome of a resolution. Immutable and shared across threads.
#[derive(Debug)]
pub struct SchemaLookupResult<S> {
    pub parsed_schema: Arc<ParsedSchema<S>>,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub global_id: Option<i64>,
    pub content_id: Option<i64>,
    pub content_hash: Option<String>,
}

impl<S> SchemaLookupResult<S> {
    /// Result carrying only a schema; identifiers are added with the
    /// builder-style setters.
    pub fn new(parsed_schema: Arc<ParsedSchema<S>>) -> Self {
        Self {
            parsed_schema,
            group_id: None,
            artifact_id: None,
            version: None,
            global_id: None,
            content_id: None,
            content_hash: None,
        }
    }

    /// Result populated from what the registry returned for a version
    pub fn from_metadata(metadata: ArtifactMetadata, parsed_schema: Arc<ParsedSchema<S>>) -> Self {
        Self {
            parsed_schema,
            group_id: metadata.group_id,
            artifact_id: Some(metadata.artifact_id),
            version: Some(metadata.version),
            global_id: Some(metadata.global_id),
            content_id: Some(metadata.content_id),
            content_hash: metadata.content_hash,
        }
    }

    pub fn with_global_id(mut self, global_id: i64) -> Self {
        self.global_id = Some(global_id);
        self
    }

    pub fn with_content_id(mut self, content_id: i64) -> Self {
        self.content_id = Some(content_id);
        self
    }

    pub fn with_content_hash(mut self, content_hash: impl Into<String>) -> Self {
        self.content_hash = Some(content_hash.into());
        self
    }

    pub fn coordinates(&self) -> Option<ArtifactCoordinates> {
        let artifact_id = self.artifact_id.as_deref()?;
        Some(ArtifactCoordinates::new(
            self.group_id.clone(),
            artifact_id,
            self.version.clone(),
        ))
    }

    pub fn to_artifact_reference(&self) -> ArtifactReference {
        ArtifactReference {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: self.version.clone(),
            global_id: self.global_id,
            content_id: self.content_id,
            content_hash: self.content_hash.clone(),
        }
    }

    /// Registry reference entry pointing at this result from a parent
    /// schema that calls it `name`. `None` if the result has no artifact id.
    pub fn to_reference_descriptor(&self, name: impl Into<String>) -> Option<ReferenceDescriptor> {
        Some(ReferenceDescriptor {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone()?,
            version: self.version.clone(),
            name: name.into(),
        })
    }
}
