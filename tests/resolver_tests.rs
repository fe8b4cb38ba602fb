//! Resolver behaviour against the in-memory registry

use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

use apache_avro::types::Value;
use cdc_schema_resolver::artifact::{ArtifactType, IfExists, ReferenceDescriptor};
use cdc_schema_resolver::parser::ResolvedReferences;
use cdc_schema_resolver::registry::CreateArtifact;
use cdc_schema_resolver::{
    ArtifactReference, AvroRecord, AvroSchemaParser, ChangeRecord, Headers, InMemoryRegistry,
    ParsedSchema, Record, RecordMetadata, RegistryClient, RegistryError, ResolverConfig,
    SchemaError, SchemaParser, SchemaResolver, TableIdStrategy, TopicIdStrategy,
};

/// Parsed form of a text schema: the text plus the names it could resolve
#[derive(Debug, Clone, PartialEq)]
struct TextSchema {
    text: String,
    dependencies: Vec<String>,
}

/// Payload carrying the schema it was written with
struct Payload {
    schema: ParsedSchema<TextSchema>,
}

struct TextParser {
    extracts: bool,
}

impl SchemaParser for TextParser {
    type Schema = TextSchema;
    type Data = Payload;

    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::Json
    }

    fn parse_schema(
        &self,
        raw: &[u8],
        references: &ResolvedReferences<TextSchema>,
    ) -> cdc_schema_resolver::Result<TextSchema> {
        let text = String::from_utf8_lossy(raw).into_owned();
        if text.starts_with("invalid") {
            return Err(SchemaError::SchemaParse(text));
        }
        Ok(TextSchema {
            text,
            dependencies: references.keys().cloned().collect(),
        })
    }

    fn supports_extract_schema_from_data(&self) -> bool {
        self.extracts
    }

    fn schema_from_data(
        &self,
        record: &dyn Record<Payload>,
        _dereference: bool,
    ) -> cdc_schema_resolver::Result<ParsedSchema<TextSchema>> {
        record
            .payload()
            .map(|payload| payload.schema.clone())
            .ok_or_else(|| SchemaError::InvalidInput("no payload".to_string()))
    }

    fn supports_schema_from_location(&self) -> bool {
        true
    }

    fn schema_from_location(&self, location: &str) -> cdc_schema_resolver::Result<ParsedSchema<TextSchema>> {
        let raw = std::fs::read(location)?;
        let schema = self.parse_schema(&raw, &ResolvedReferences::new())?;
        Ok(ParsedSchema::new(raw, schema))
    }
}

fn text_schema(text: &str) -> ParsedSchema<TextSchema> {
    ParsedSchema::new(
        text.as_bytes().to_vec(),
        TextSchema {
            text: text.to_string(),
            dependencies: Vec::new(),
        },
    )
}

fn table_header(table: &str) -> Headers {
    Headers::new().with(
        "__from_table",
        format!(r#"{{"schema":"s","payload":"{table}"}}"#).into_bytes(),
    )
}

fn record(table: &str, schema: ParsedSchema<TextSchema>) -> ChangeRecord<Payload> {
    let metadata = RecordMetadata::new("cdc.all_tables", false).with_headers(Some(table_header(table)));
    ChangeRecord::new(metadata, Payload { schema })
}

fn resolver(
    registry: &Arc<InMemoryRegistry>,
    config: ResolverConfig,
) -> SchemaResolver<TextParser> {
    SchemaResolver::new(
        TextParser { extracts: true },
        registry.clone(),
        Arc::new(TableIdStrategy::default()),
        config,
    )
    .unwrap()
}

fn auto_register() -> ResolverConfig {
    ResolverConfig {
        auto_register: true,
        ..ResolverConfig::default()
    }
}

fn register(registry: &InMemoryRegistry, artifact_id: &str, content: &str, references: &[ReferenceDescriptor]) -> i64 {
    registry
        .create_artifact(&CreateArtifact {
            group_id: None,
            artifact_id,
            version: None,
            artifact_type: ArtifactType::Json,
            if_exists: IfExists::Update,
            canonical: false,
            content: content.as_bytes(),
            references,
        })
        .unwrap()
        .global_id
}

fn descriptor(artifact_id: &str, name: &str) -> ReferenceDescriptor {
    ReferenceDescriptor {
        group_id: None,
        artifact_id: artifact_id.to_string(),
        version: Some("1".to_string()),
        name: name.to_string(),
    }
}

#[test]
fn test_auto_register_once_per_content() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    let first = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap();
    let second = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.artifact_id.as_deref(), Some("orders-value"));
    assert_eq!(first.parsed_schema.parsed().text, "orders-schema");
    assert_eq!(registry.calls().create_artifact, 1);
    assert_eq!(registry.calls().total(), 1);
}

#[test]
fn test_tables_sharing_a_topic_get_separate_artifacts() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    let orders = resolver
        .resolve_schema(&record("orders", text_schema("same-schema")))
        .unwrap();
    let patients = resolver
        .resolve_schema(&record("patients", text_schema("same-schema")))
        .unwrap();

    assert_eq!(orders.artifact_id.as_deref(), Some("orders-value"));
    assert_eq!(patients.artifact_id.as_deref(), Some("patients-value"));
    assert_ne!(orders.global_id, patients.global_id);
    // identical content is stored once
    assert_eq!(orders.content_id, patients.content_id);
    assert_eq!(registry.calls().create_artifact, 2);
}

#[test]
fn test_concurrent_first_sighting_registers_once() {
    const THREADS: usize = 8;

    let registry = Arc::new(InMemoryRegistry::new());
    registry.set_latency(Some(Duration::from_millis(50)));
    let resolver = resolver(&registry, auto_register());
    let barrier = Barrier::new(THREADS);

    let global_ids: Vec<Option<i64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    resolver
                        .resolve_schema(&record("orders", text_schema("orders-schema")))
                        .unwrap()
                        .global_id
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(registry.calls().create_artifact, 1);
    assert_eq!(registry.version_count(), 1);
    assert!(global_ids.iter().all(|id| *id == global_ids[0]));
    assert!(global_ids[0].is_some());
}

#[test]
fn test_coordinates_result_reachable_by_global_id() {
    let registry = Arc::new(InMemoryRegistry::new());
    let global_id = register(&registry, "orders-value", "orders-schema", &[]);

    let config = ResolverConfig {
        find_latest: true,
        ..ResolverConfig::default()
    };
    let resolver = resolver(&registry, config);

    let by_coordinates = resolver
        .resolve_schema(&record("orders", text_schema("ignored")))
        .unwrap();
    assert_eq!(by_coordinates.global_id, Some(global_id));
    assert_eq!(by_coordinates.parsed_schema.parsed().text, "orders-schema");

    let calls = registry.calls();
    assert_eq!(calls.artifact_metadata, 1);
    assert_eq!(calls.create_artifact, 1);

    let by_global_id = resolver
        .resolve_schema_by_artifact_reference(&ArtifactReference::for_global_id(global_id))
        .unwrap();
    assert!(Arc::ptr_eq(&by_coordinates, &by_global_id));

    let content_id = by_coordinates.content_id.unwrap();
    let by_content_id = resolver
        .resolve_schema_by_artifact_reference(&ArtifactReference::for_content_id(content_id))
        .unwrap();
    assert!(Arc::ptr_eq(&by_coordinates, &by_content_id));

    // latest by coordinates is now a cache hit as well
    resolver
        .resolve_schema(&record("orders", text_schema("ignored")))
        .unwrap();
    assert_eq!(registry.calls(), calls);
}

#[test]
fn test_references_registered_before_dependents() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    let country = Arc::new(text_schema("country-schema").with_reference_name("Country"));
    let address = Arc::new(
        text_schema("address-schema")
            .with_references(vec![country])
            .with_reference_name("Address"),
    );
    let customer = text_schema("customer-schema").with_references(vec![address]);

    let result = resolver.resolve_schema(&record("customers", customer.clone())).unwrap();

    assert_eq!(registry.list_versions(None, "Country"), vec!["1"]);
    assert_eq!(registry.list_versions(None, "Address"), vec!["1"]);
    assert_eq!(result.artifact_id.as_deref(), Some("customers-value"));
    // global ids are handed out in creation order
    assert_eq!(result.global_id, Some(3));
    assert_eq!(registry.calls().create_artifact, 3);

    let references = registry
        .get_artifact_references_by_global_id(3)
        .unwrap();
    assert_eq!(references, vec![descriptor("Address", "Address")]);
    let nested = registry.get_artifact_references_by_global_id(2).unwrap();
    assert_eq!(nested, vec![descriptor("Country", "Country")]);

    // a second record with the same schema registers nothing
    let before = registry.calls();
    resolver.resolve_schema(&record("customers", customer)).unwrap();
    assert_eq!(registry.calls(), before);
}

#[test]
fn test_fetched_schema_gets_transitive_references() {
    let registry = Arc::new(InMemoryRegistry::new());
    register(&registry, "country", "country-schema", &[]);
    register(&registry, "address", "address-schema", &[descriptor("country", "Country")]);
    register(&registry, "customer", "customer-schema", &[descriptor("address", "Address")]);

    let resolver = resolver(&registry, ResolverConfig::default());
    let result = resolver.resolve_by_coordinates(None, "customer", None).unwrap();

    let parsed = &result.parsed_schema;
    assert_eq!(parsed.parsed().dependencies, vec!["Address", "Country"]);
    assert_eq!(parsed.references().len(), 1);
    assert_eq!(parsed.references()[0].reference_name(), Some("Address"));
    assert_eq!(parsed.references()[0].references()[0].reference_name(), Some("Country"));

    // dependencies are cached by their coordinates
    assert!(resolver.resolve_by_coordinates(None, "country", Some("1")).is_ok());
    assert_eq!(registry.calls().version_metadata, 2);
}

fn latest(artifact_id: &str, name: &str) -> ReferenceDescriptor {
    ReferenceDescriptor {
        version: None,
        ..descriptor(artifact_id, name)
    }
}

/// Run `resolve` on its own thread, failing the test if it does not return
fn resolve_within<F>(resolve: F) -> cdc_schema_resolver::Result<Option<i64>>
where
    F: FnOnce() -> cdc_schema_resolver::Result<Option<i64>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(resolve());
    });
    rx.recv_timeout(Duration::from_secs(5))
        .expect("resolution did not return")
}

#[test]
fn test_self_referencing_schema_is_rejected() {
    let registry = Arc::new(InMemoryRegistry::new());
    register(&registry, "a", "a-v1", &[]);
    let v2 = register(&registry, "a", "a-v2", &[latest("a", "A")]);
    let resolver = Arc::new(resolver(&registry, ResolverConfig::default()));

    let by_coordinates = Arc::clone(&resolver);
    let err = resolve_within(move || {
        by_coordinates
            .resolve_by_coordinates(None, "a", None)
            .map(|r| r.global_id)
    })
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference(ref m) if m.contains("cyclic")));

    let by_global_id = Arc::clone(&resolver);
    let err = resolve_within(move || {
        by_global_id
            .resolve_schema_by_artifact_reference(&ArtifactReference::for_global_id(v2))
            .map(|r| r.global_id)
    })
    .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidReference(_)));
    assert!(resolver.cache().is_empty());

    // pinned versions outside the cycle still resolve
    let v1 = resolve_within(move || {
        resolver
            .resolve_by_coordinates(None, "a", Some("1"))
            .map(|r| r.global_id)
    })
    .unwrap();
    assert_eq!(v1, Some(1));
}

#[test]
fn test_reference_cycle_across_artifacts_is_rejected() {
    let registry = Arc::new(InMemoryRegistry::new());
    register(&registry, "a", "a-v1", &[]);
    register(&registry, "b", "b-v1", &[latest("a", "A")]);
    register(&registry, "a", "a-v2", &[latest("b", "B")]);
    let resolver = Arc::new(resolver(&registry, ResolverConfig::default()));

    let (a, b) = (Arc::clone(&resolver), Arc::clone(&resolver));
    let from_a = resolve_within(move || a.resolve_by_coordinates(None, "a", None).map(|r| r.global_id));
    let from_b = resolve_within(move || b.resolve_by_coordinates(None, "b", None).map(|r| r.global_id));

    assert!(matches!(from_a, Err(SchemaError::InvalidReference(_))));
    assert!(matches!(from_b, Err(SchemaError::InvalidReference(_))));
}

#[test]
fn test_lookup_by_content_without_registering() {
    let registry = Arc::new(InMemoryRegistry::new());
    register(&registry, "orders-value", "orders-v1", &[]);
    let v2 = register(&registry, "orders-value", "orders-v2", &[]);

    let resolver = resolver(&registry, ResolverConfig::default());
    let result = resolver
        .resolve_schema(&record("orders", text_schema("orders-v2")))
        .unwrap();
    assert_eq!(result.global_id, Some(v2));
    assert_eq!(result.version.as_deref(), Some("2"));

    resolver
        .resolve_schema(&record("orders", text_schema("orders-v2")))
        .unwrap();
    let calls = registry.calls();
    assert_eq!(calls.metadata_by_content, 1);
    assert_eq!(calls.create_artifact, 2);

    let unknown = resolver.resolve_schema(&record("orders", text_schema("orders-v3")));
    assert!(matches!(
        unknown,
        Err(SchemaError::Registry(RegistryError::NotFound(_)))
    ));
}

#[test]
fn test_explicit_version_resolves_by_coordinates() {
    let registry = Arc::new(InMemoryRegistry::new());
    let v1 = register(&registry, "pinned", "schema-v1", &[]);
    register(&registry, "pinned", "schema-v2", &[]);

    let config = ResolverConfig {
        explicit_artifact_id: Some("pinned".to_string()),
        explicit_artifact_version: Some("1".to_string()),
        ..ResolverConfig::default()
    };
    let resolver = resolver(&registry, config);

    let result = resolver
        .resolve_schema(&record("orders", text_schema("whatever")))
        .unwrap();
    assert_eq!(result.global_id, Some(v1));
    assert_eq!(result.parsed_schema.parsed().text, "schema-v1");
    assert_eq!(registry.calls().version_metadata, 1);
}

#[test]
fn test_registry_failure_is_returned_and_not_cached() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    registry.set_offline(true);
    let err = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap_err();
    assert!(matches!(err, SchemaError::Registry(RegistryError::Unavailable(_))));
    assert!(resolver.cache().is_empty());

    registry.set_offline(false);
    let result = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap();
    assert_eq!(result.global_id, Some(1));
    assert_eq!(registry.calls().create_artifact, 2);
}

#[test]
fn test_concurrent_callers_share_registry_failure() {
    const THREADS: usize = 6;

    let registry = Arc::new(InMemoryRegistry::new());
    registry.set_offline(true);
    registry.set_latency(Some(Duration::from_millis(200)));
    let resolver = resolver(&registry, auto_register());
    let barrier = Barrier::new(THREADS);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    resolver
                        .resolve_schema(&record("orders", text_schema("orders-schema")))
                        .map(|r| r.global_id)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results
        .iter()
        .all(|r| matches!(r, Err(SchemaError::Registry(RegistryError::Unavailable(_))))));
    assert_eq!(registry.calls().create_artifact, 1);
    assert!(resolver.cache().is_empty());
}

#[test]
fn test_content_id_out_of_range_is_not_found() {
    let registry = Arc::new(InMemoryRegistry::new());
    register(&registry, "a", "a-v1", &[]);
    let resolver = resolver(&registry, ResolverConfig::default());

    for content_id in [i64::MIN, 0, 2] {
        let err = resolver
            .resolve_schema_by_artifact_reference(&ArtifactReference::for_content_id(content_id))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Registry(RegistryError::NotFound(_))));
    }
}

#[test]
fn test_missing_table_header_falls_back_to_topic() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    let metadata = RecordMetadata::new("t1", true).with_headers(None);
    let record = ChangeRecord::new(metadata, Payload { schema: text_schema("key-schema") });
    let result = resolver.resolve_schema(&record).unwrap();
    assert_eq!(result.artifact_id.as_deref(), Some("t1-key"));
}

#[test]
fn test_auto_register_from_explicit_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.schema");
    std::fs::write(&path, "schema-from-file").unwrap();

    let registry = Arc::new(InMemoryRegistry::new());
    let config = ResolverConfig {
        auto_register: true,
        explicit_schema_location: Some(path.to_str().unwrap().to_string()),
        ..ResolverConfig::default()
    };
    let resolver = SchemaResolver::new(
        TextParser { extracts: false },
        registry.clone(),
        Arc::new(TableIdStrategy::default()),
        config,
    )
    .unwrap();

    let result = resolver
        .resolve_schema(&record("orders", text_schema("ignored")))
        .unwrap();
    assert_eq!(result.parsed_schema.parsed().text, "schema-from-file");
    assert_eq!(result.artifact_id.as_deref(), Some("orders-value"));
    assert_eq!(registry.calls().create_artifact, 1);
}

#[test]
fn test_configuration_errors() {
    let registry = Arc::new(InMemoryRegistry::new());

    let needs_schema = SchemaResolver::new(
        TextParser { extracts: false },
        registry.clone(),
        Arc::new(TopicIdStrategy),
        ResolverConfig::default(),
    );
    assert!(matches!(needs_schema, Err(SchemaError::Configuration(_))));

    let no_source = SchemaResolver::new(
        TextParser { extracts: false },
        registry,
        Arc::new(TableIdStrategy::default()),
        auto_register(),
    );
    assert!(matches!(no_source, Err(SchemaError::Configuration(_))));
}

#[test]
fn test_reset_drops_cached_schemas() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = resolver(&registry, auto_register());

    let first = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap();
    resolver.reset();
    assert!(resolver.cache().is_empty());

    let second = resolver
        .resolve_schema(&record("orders", text_schema("orders-schema")))
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    // RETURN_OR_UPDATE hands back the existing version
    assert_eq!(first.global_id, second.global_id);
    assert_eq!(registry.calls().create_artifact, 2);
}

#[test]
fn test_resolve_by_reference_priority_and_parse_errors() {
    let registry = Arc::new(InMemoryRegistry::new());
    let good = register(&registry, "good", "good-schema", &[]);
    let bad = register(&registry, "bad", "invalid-schema", &[]);
    let resolver = resolver(&registry, ResolverConfig::default());

    // content id wins over global id
    let reference = ArtifactReference {
        content_id: Some(1),
        global_id: Some(bad),
        ..ArtifactReference::default()
    };
    let result = resolver.resolve_schema_by_artifact_reference(&reference).unwrap();
    assert_eq!(result.parsed_schema.parsed().text, "good-schema");
    assert_eq!(registry.calls().content_by_id, 1);
    assert_eq!(registry.calls().content_by_global_id, 0);

    let err = resolver
        .resolve_schema_by_artifact_reference(&ArtifactReference::for_global_id(bad))
        .unwrap_err();
    assert!(matches!(err, SchemaError::SchemaParse(_)));

    let by_name = resolver
        .resolve_schema_by_artifact_reference(&ArtifactReference::for_artifact("good"))
        .unwrap();
    assert_eq!(by_name.global_id, Some(good));
}

#[test]
fn test_avro_end_to_end() {
    let registry = Arc::new(InMemoryRegistry::new());
    let resolver = SchemaResolver::new(
        AvroSchemaParser::new(),
        registry.clone(),
        Arc::new(TopicIdStrategy),
        auto_register(),
    )
    .unwrap();

    let schema = apache_avro::Schema::parse_str(
        r#"{"type": "record", "name": "Order", "fields": [{"name": "id", "type": "long"}]}"#,
    )
    .unwrap();
    let record = ChangeRecord::new(
        RecordMetadata::new("orders", false),
        AvroRecord::new(schema.clone(), Value::Record(vec![("id".to_string(), Value::Long(1))])),
    );

    let result = resolver.resolve_schema(&record).unwrap();
    assert_eq!(result.artifact_id.as_deref(), Some("orders-value"));
    assert_eq!(result.parsed_schema.parsed(), &schema);

    let fetched = SchemaResolver::new(
        AvroSchemaParser::new(),
        registry.clone(),
        Arc::new(TopicIdStrategy),
        ResolverConfig::default(),
    )
    .unwrap()
    .resolve_schema_by_artifact_reference(&ArtifactReference::for_global_id(1))
    .unwrap();
    assert_eq!(fetched.parsed_schema.parsed(), &schema);
}
