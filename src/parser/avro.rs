//! AVRO schemas via `apache-avro`

use apache_avro::types::Value;
use apache_avro::Schema;

use super::{ResolvedReferences, SchemaParser};
use crate::artifact::ArtifactType;
use crate::error::{Result, SchemaError};
use crate::record::Record;
use crate::schema::ParsedSchema;

/// An AVRO datum together with the schema it was written with
#[derive(Debug, Clone, PartialEq)]
pub struct AvroRecord {
    pub schema: Schema,
    pub value: Value,
}

impl AvroRecord {
    pub fn new(schema: Schema, value: Value) -> Self {
        Self { schema, value }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AvroSchemaParser;

impl AvroSchemaParser {
    pub fn new() -> Self {
        Self
    }
}

fn utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| SchemaError::SchemaParse(format!("schema is not valid UTF-8: {e}")))
}

impl SchemaParser for AvroSchemaParser {
    type Schema = Schema;
    type Data = AvroRecord;

    fn artifact_type(&self) -> ArtifactType {
        ArtifactType::Avro
    }

    fn parse_schema(&self, raw: &[u8], references: &ResolvedReferences<Schema>) -> Result<Schema> {
        let text = utf8(raw)?;
        if references.is_empty() {
            return Ok(Schema::parse_str(text)?);
        }

        // named dependencies first, the schema itself last
        let mut inputs = Vec::with_capacity(references.len() + 1);
        for reference in references.values() {
            inputs.push(utf8(reference.raw_schema())?);
        }
        inputs.push(text);

        Schema::parse_list(&inputs)?
            .pop()
            .ok_or_else(|| SchemaError::SchemaParse("empty schema list".to_string()))
    }

    fn supports_extract_schema_from_data(&self) -> bool {
        true
    }

    /// AVRO payloads carry their schema fully inlined, so `dereference` has
    /// no effect and no references are returned.
    fn schema_from_data(
        &self,
        record: &dyn Record<AvroRecord>,
        _dereference: bool,
    ) -> Result<ParsedSchema<Schema>> {
        let payload = record
            .payload()
            .ok_or_else(|| SchemaError::InvalidInput("record has no payload".to_string()))?;
        let raw = serde_json::to_vec(&payload.schema)?;
        Ok(ParsedSchema::new(raw, payload.schema.clone()))
    }

    fn supports_schema_from_location(&self) -> bool {
        true
    }

    fn schema_from_location(&self, location: &str) -> Result<ParsedSchema<Schema>> {
        let raw = std::fs::read(location)?;
        let schema = self.parse_schema(&raw, &ResolvedReferences::new())?;
        Ok(ParsedSchema::new(raw, schema))
    }
}
