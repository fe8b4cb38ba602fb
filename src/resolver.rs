//! Schema resolution.
//!
//! [`SchemaResolver`] turns a change record into the registry schema it was
//! written with. A lookup first probes the multi-key cache with whatever
//! identifiers the artifact reference carries, and only on a miss talks to
//! the registry: registering the schema (dependencies first) when
//! auto-registration is on, otherwise finding it by coordinates or by
//! content. Every result is cached under all of its keys.

use std::sync::Arc;

use tracing::{debug, info};

use crate::artifact::{ArtifactCoordinates, ArtifactReference, ReferenceDescriptor};
use crate::cache::{CachedSchema, ContentKey, SchemaCache};
use crate::config::ResolverConfig;
use crate::error::{Result, SchemaError};
use crate::parser::{ResolvedReferences, SchemaParser};
use crate::record::{Record, RecordMetadata};
use crate::registry::{CreateArtifact, RegistryClient};
use crate::schema::{ParsedSchema, SchemaLookupResult};
use crate::strategy::ArtifactReferenceStrategy;

type Parsed<P> = ParsedSchema<<P as SchemaParser>::Schema>;

/// Resolves, caches and optionally registers the schemas of change records.
///
/// One instance is shared by every worker of a pipeline; its caches live
/// exactly as long as it does.
pub struct SchemaResolver<P: SchemaParser> {
    parser: P,
    client: Arc<dyn RegistryClient>,
    strategy: Arc<dyn ArtifactReferenceStrategy>,
    cache: SchemaCache<P::Schema>,
    config: ResolverConfig,
}

impl<P: SchemaParser> SchemaResolver<P> {
    /// Build a resolver, rejecting configurations that could never resolve
    /// a record.
    pub fn new(
        parser: P,
        client: Arc<dyn RegistryClient>,
        strategy: Arc<dyn ArtifactReferenceStrategy>,
        config: ResolverConfig,
    ) -> Result<Self> {
        let extracts = parser.supports_extract_schema_from_data();

        if strategy.load_schema() && !extracts {
            return Err(SchemaError::Configuration(format!(
                "the artifact reference strategy needs the record schema, but the {} parser \
                 cannot extract schemas from data",
                parser.artifact_type()
            )));
        }

        if config.auto_register && !extracts {
            let has_location =
                config.explicit_schema_location.is_some() && parser.supports_schema_from_location();
            if !has_location {
                return Err(SchemaError::Configuration(format!(
                    "auto-register is enabled, but the {} parser cannot extract schemas from data \
                     and no supported explicit-schema-location is configured",
                    parser.artifact_type()
                )));
            }
        }

        Ok(Self {
            parser,
            client,
            strategy,
            cache: SchemaCache::new(),
            config,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn cache(&self) -> &SchemaCache<P::Schema> {
        &self.cache
    }

    /// Drop every cached schema
    pub fn reset(&self) {
        self.cache.clear();
    }

    /// Resolve the schema of `record`.
    ///
    /// Fails with [`SchemaError::InvalidInput`] when the record carries no
    /// payload. Registry failures are returned as they are; nothing is
    /// retried here.
    pub fn resolve_schema(&self, record: &dyn Record<P::Data>) -> Result<CachedSchema<P::Schema>> {
        if record.payload().is_none() {
            return Err(SchemaError::InvalidInput(format!(
                "record on topic {} has no payload",
                record.metadata().topic
            )));
        }

        let mut parsed = None;
        if self.strategy.load_schema() && self.parser.supports_extract_schema_from_data() {
            parsed = Some(self.schema_from_data(record)?);
        }

        let reference = self.artifact_reference(record.metadata());
        if let Some(cached) = self.cached(&reference) {
            return Ok(cached);
        }

        self.schema_from_registry(parsed, record, &reference)
    }

    /// Resolve a reference a caller already holds, bypassing the strategy.
    ///
    /// Lookup order is content id, content hash, global id, coordinates.
    pub fn resolve_schema_by_artifact_reference(
        &self,
        reference: &ArtifactReference,
    ) -> Result<CachedSchema<P::Schema>> {
        if !reference.is_addressable() {
            return Err(SchemaError::InvalidReference(
                "artifact reference carries no identifier".to_string(),
            ));
        }

        if let Some(content_id) = reference.content_id {
            return self.resolve_by_content_id(content_id);
        }
        if let Some(content_hash) = reference.content_hash.as_deref().filter(|h| !h.is_empty()) {
            return self.resolve_by_content_hash(content_hash);
        }
        if let Some(global_id) = reference.global_id {
            return self.resolve_by_global_id(global_id);
        }

        let artifact_id = required_artifact_id(reference)?;
        self.resolve_by_coordinates(
            reference.group_id.as_deref(),
            artifact_id,
            reference.version.as_deref(),
        )
    }

    /// Resolve an artifact version by coordinates. Without a version the
    /// latest one is used.
    pub fn resolve_by_coordinates(
        &self,
        group_id: Option<&str>,
        artifact_id: &str,
        version: Option<&str>,
    ) -> Result<CachedSchema<P::Schema>> {
        let coordinates = ArtifactCoordinates::new(
            group_id.map(str::to_string),
            artifact_id,
            version.map(str::to_string),
        );

        self.cache.get_or_load_by_coordinates(&coordinates, || {
            let mut loading = vec![coordinates.clone()];
            self.load_by_coordinates(&coordinates, &mut loading)
        })
    }

    pub fn resolve_by_global_id(&self, global_id: i64) -> Result<CachedSchema<P::Schema>> {
        self.cache.get_or_load_by_global_id(global_id, || {
            debug!(global_id, "resolving schema by global id");
            let dereference = self.config.register_dereferenced;
            let raw = self.client.get_content_by_global_id(global_id, dereference)?;
            let references = if dereference {
                Vec::new()
            } else {
                self.client.get_artifact_references_by_global_id(global_id)?
            };
            let parsed = self.parse(raw, references, &mut Vec::new())?;
            Ok(SchemaLookupResult::new(parsed).with_global_id(global_id))
        })
    }

    pub fn resolve_by_content_id(&self, content_id: i64) -> Result<CachedSchema<P::Schema>> {
        self.cache.get_or_load_by_content_id(content_id, || {
            debug!(content_id, "resolving schema by content id");
            let raw = self.client.get_content_by_id(content_id)?;
            let references = self.client.get_artifact_references_by_content_id(content_id)?;
            let parsed = self.parse(raw, references, &mut Vec::new())?;
            Ok(SchemaLookupResult::new(parsed).with_content_id(content_id))
        })
    }

    pub fn resolve_by_content_hash(&self, content_hash: &str) -> Result<CachedSchema<P::Schema>> {
        self.cache.get_or_load_by_content_hash(content_hash, || {
            debug!(content_hash, "resolving schema by content hash");
            let raw = self.client.get_content_by_hash(content_hash)?;
            let references = self
                .client
                .get_artifact_references_by_content_hash(content_hash)?;
            let parsed = self.parse(raw, references, &mut Vec::new())?;
            Ok(SchemaLookupResult::new(parsed).with_content_hash(content_hash))
        })
    }

    /// Reference of a top-level record: the strategy's, with the explicit
    /// overrides applied.
    fn artifact_reference(&self, metadata: &RecordMetadata) -> ArtifactReference {
        let mut reference = self.strategy.artifact_reference(metadata);
        if let Some(artifact_id) = &self.config.explicit_artifact_id {
            reference.artifact_id = Some(artifact_id.clone());
        }
        self.apply_overrides(reference)
    }

    /// Nested schemas are registered under their reference name
    fn nested_reference(&self, reference_name: &str) -> ArtifactReference {
        self.apply_overrides(ArtifactReference::for_artifact(reference_name))
    }

    fn apply_overrides(&self, mut reference: ArtifactReference) -> ArtifactReference {
        if let Some(group_id) = &self.config.explicit_artifact_group_id {
            reference.group_id = Some(group_id.clone());
        }
        if let Some(version) = &self.config.explicit_artifact_version {
            reference.version = Some(version.clone());
        }
        reference
    }

    fn cached(&self, reference: &ArtifactReference) -> Option<CachedSchema<P::Schema>> {
        let hit = reference
            .global_id
            .and_then(|id| self.cache.get_by_global_id(id))
            .or_else(|| reference.content_id.and_then(|id| self.cache.get_by_content_id(id)))
            .or_else(|| {
                reference
                    .content_hash
                    .as_deref()
                    .and_then(|hash| self.cache.get_by_content_hash(hash))
            })
            .or_else(|| {
                reference
                    .coordinates()
                    .and_then(|coordinates| self.cache.get_by_coordinates(&coordinates))
            });

        if let Some(result) = &hit {
            debug!(
                artifact_id = result.artifact_id.as_deref().unwrap_or_default(),
                global_id = result.global_id,
                "schema cache hit"
            );
        }
        hit
    }

    fn schema_from_registry(
        &self,
        parsed: Option<Parsed<P>>,
        record: &dyn Record<P::Data>,
        reference: &ArtifactReference,
    ) -> Result<CachedSchema<P::Schema>> {
        let extracts = self.parser.supports_extract_schema_from_data();

        if self.config.auto_register {
            if extracts {
                let parsed = match parsed {
                    Some(parsed) => parsed,
                    None => self.schema_from_data(record)?,
                };
                return self.auto_create(reference, Arc::new(parsed));
            }

            if let Some(location) = self.config.explicit_schema_location.as_deref() {
                if self.parser.supports_schema_from_location() {
                    let parsed = self.parser.schema_from_location(location)?;
                    return self.create_artifact(reference, Arc::new(parsed), Vec::new());
                }
            }
        }

        let artifact_id = required_artifact_id(reference)?;

        if self.config.find_latest || reference.version.is_some() {
            return self.resolve_by_coordinates(
                reference.group_id.as_deref(),
                artifact_id,
                reference.version.as_deref(),
            );
        }

        if extracts {
            let parsed = match parsed {
                Some(parsed) => parsed,
                None => self.schema_from_data(record)?,
            };
            return self.resolve_by_content(reference, artifact_id, Arc::new(parsed));
        }

        self.resolve_by_coordinates(reference.group_id.as_deref(), artifact_id, None)
    }

    fn schema_from_data(&self, record: &dyn Record<P::Data>) -> Result<Parsed<P>> {
        self.parser
            .schema_from_data(record, self.config.register_dereferenced)
    }

    /// Register `parsed` after every schema it depends on
    fn auto_create(
        &self,
        reference: &ArtifactReference,
        parsed: Arc<Parsed<P>>,
    ) -> Result<CachedSchema<P::Schema>> {
        let artifact_id = required_artifact_id(reference)?;
        if let Some(cached) = self
            .cache
            .get_by_content(&ContentKey::new(parsed.raw_schema(), artifact_id))
        {
            return Ok(cached);
        }

        let references = self.register_references(&parsed)?;
        self.create_artifact(reference, parsed, references)
    }

    /// Depth first: a referenced artifact is always created before the
    /// artifact that refers to it.
    fn register_references(&self, parsed: &Parsed<P>) -> Result<Vec<ReferenceDescriptor>> {
        let mut descriptors = Vec::with_capacity(parsed.references().len());

        for nested in parsed.references() {
            let name = nested.reference_name().ok_or_else(|| {
                SchemaError::InvalidReference("nested schema has no reference name".to_string())
            })?;

            let nested_references = self.register_references(nested)?;
            let reference = self.nested_reference(name);
            let result = self.create_artifact(&reference, Arc::clone(nested), nested_references)?;

            let descriptor = result.to_reference_descriptor(name).ok_or_else(|| {
                SchemaError::InvalidReference(format!("reference {name} resolved without an artifact id"))
            })?;
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }

    /// Create (or reuse) the artifact, at most once per content key
    fn create_artifact(
        &self,
        reference: &ArtifactReference,
        parsed: Arc<Parsed<P>>,
        references: Vec<ReferenceDescriptor>,
    ) -> Result<CachedSchema<P::Schema>> {
        let artifact_id = required_artifact_id(reference)?;
        let key = ContentKey::new(parsed.raw_schema(), artifact_id);

        self.cache.get_or_load_by_content(&key, || {
            let metadata = self.client.create_artifact(&CreateArtifact {
                group_id: reference.group_id.as_deref(),
                artifact_id,
                version: reference.version.as_deref(),
                artifact_type: self.parser.artifact_type(),
                if_exists: self.config.auto_register_if_exists,
                canonical: false,
                content: parsed.raw_schema(),
                references: &references,
            })?;

            info!(
                artifact_id,
                version = %metadata.version,
                global_id = metadata.global_id,
                references = references.len(),
                "registered schema artifact"
            );
            Ok(SchemaLookupResult::from_metadata(metadata, parsed))
        })
    }

    /// Find the registered version whose content equals `parsed`
    fn resolve_by_content(
        &self,
        reference: &ArtifactReference,
        artifact_id: &str,
        parsed: Arc<Parsed<P>>,
    ) -> Result<CachedSchema<P::Schema>> {
        let key = ContentKey::new(parsed.raw_schema(), artifact_id);

        self.cache.get_or_load_by_content(&key, || {
            debug!(artifact_id, "resolving schema by content");
            let metadata = self.client.get_artifact_version_metadata_by_content(
                reference.group_id.as_deref(),
                artifact_id,
                true,
                parsed.raw_schema(),
            )?;
            Ok(SchemaLookupResult::from_metadata(metadata, parsed))
        })
    }

    /// Fetch the version `coordinates` name. `loading` holds the chain of
    /// coordinates being loaded by this call, outermost first.
    fn load_by_coordinates(
        &self,
        coordinates: &ArtifactCoordinates,
        loading: &mut Vec<ArtifactCoordinates>,
    ) -> Result<SchemaLookupResult<P::Schema>> {
        debug!(%coordinates, "resolving schema by coordinates");
        let group_id = coordinates.group_id.as_deref();
        let artifact_id = coordinates.artifact_id.as_str();
        let metadata = match coordinates.version.as_deref() {
            Some(version) => self
                .client
                .get_artifact_version_metadata(group_id, artifact_id, version)?,
            None => self.client.get_artifact_metadata(group_id, artifact_id)?,
        };

        let parsed = if self.config.register_dereferenced {
            let raw = self.client.get_content_by_global_id(metadata.global_id, true)?;
            self.parse(raw, Vec::new(), loading)?
        } else {
            let raw = self.client.get_content_by_global_id(metadata.global_id, false)?;
            let references = self
                .client
                .get_artifact_references_by_global_id(metadata.global_id)?;
            self.parse(raw, references, loading)?
        };

        Ok(SchemaLookupResult::from_metadata(metadata, parsed))
    }

    /// Resolve a dependency of content being parsed.
    ///
    /// Dependencies are loaded on the calling thread without joining other
    /// callers' loads, so a reference cycle ends in an error instead of a
    /// thread waiting on itself.
    fn resolve_dependency(
        &self,
        coordinates: ArtifactCoordinates,
        loading: &mut Vec<ArtifactCoordinates>,
    ) -> Result<CachedSchema<P::Schema>> {
        if let Some(cached) = self.cache.get_by_coordinates(&coordinates) {
            return Ok(cached);
        }
        if loading.contains(&coordinates) {
            return Err(SchemaError::InvalidReference(format!(
                "cyclic schema reference to {coordinates}"
            )));
        }

        loading.push(coordinates.clone());
        let loaded = self.load_by_coordinates(&coordinates, loading);
        loading.pop();
        Ok(self.cache.insert_by_coordinates(coordinates, loaded?))
    }

    /// Parse fetched content once every schema it references is resolved
    fn parse(
        &self,
        raw: Vec<u8>,
        references: Vec<ReferenceDescriptor>,
        loading: &mut Vec<ArtifactCoordinates>,
    ) -> Result<Arc<Parsed<P>>> {
        let mut resolved = ResolvedReferences::new();
        let mut direct = Vec::with_capacity(references.len());

        for reference in &references {
            let coordinates = ArtifactCoordinates::new(
                reference.group_id.clone(),
                reference.artifact_id.as_str(),
                reference.version.clone(),
            );
            let result = self.resolve_dependency(coordinates, loading)?;
            let named = Arc::new(
                result
                    .parsed_schema
                    .as_ref()
                    .clone()
                    .with_reference_name(reference.name.as_str()),
            );
            collect_transitive(&named, &mut resolved);
            resolved.insert(reference.name.clone(), Arc::clone(&named));
            direct.push(named);
        }

        let schema = self.parser.parse_schema(&raw, &resolved)?;
        Ok(Arc::new(ParsedSchema::new(raw, schema).with_references(direct)))
    }
}

fn required_artifact_id(reference: &ArtifactReference) -> Result<&str> {
    reference
        .artifact_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SchemaError::InvalidReference("artifact id is required".to_string()))
}

fn collect_transitive<S>(schema: &Arc<ParsedSchema<S>>, into: &mut ResolvedReferences<S>) {
    for nested in schema.references() {
        if let Some(name) = nested.reference_name() {
            if !into.contains_key(name) {
                into.insert(name.to_string(), Arc::clone(nested));
                collect_transitive(nested, into);
            }
        }
    }
}
