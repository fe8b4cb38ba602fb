//! Schema parsers.
//!
//! A parser knows one artifact type: how to turn registry bytes into a typed
//! schema, and (optionally) how to read the schema a payload was written
//! with or load one from a configured location.

pub mod avro;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::ArtifactType;
use crate::error::{Result, SchemaError};
use crate::record::Record;
use crate::schema::ParsedSchema;

pub use avro::{AvroRecord, AvroSchemaParser};

/// Resolved dependencies of a schema, keyed by reference name
pub type ResolvedReferences<S> = BTreeMap<String, Arc<ParsedSchema<S>>>;

pub trait SchemaParser: Send + Sync {
    /// In-memory schema representation
    type Schema: Send + Sync + 'static;
    /// Payload type of the records this parser reads schemas from
    type Data;

    fn artifact_type(&self) -> ArtifactType;

    /// Parse raw registry content. `references` holds every schema the
    /// content depends on, transitively.
    fn parse_schema(
        &self,
        raw: &[u8],
        references: &ResolvedReferences<Self::Schema>,
    ) -> Result<Self::Schema>;

    fn supports_extract_schema_from_data(&self) -> bool;

    /// Schema the record's payload was written with. With `dereference`
    /// set, nested schemas are inlined rather than returned as references.
    fn schema_from_data(
        &self,
        record: &dyn Record<Self::Data>,
        dereference: bool,
    ) -> Result<ParsedSchema<Self::Schema>>;

    fn supports_schema_from_location(&self) -> bool {
        false
    }

    fn schema_from_location(&self, location: &str) -> Result<ParsedSchema<Self::Schema>> {
        Err(SchemaError::Configuration(format!(
            "{} parser cannot load schemas from a location ({location})",
            self.artifact_type()
        )))
    }
}
