//! Artifact reference strategies.
//!
//! A strategy maps a message's metadata to the registry artifact its schema
//! lives under. [`TableIdStrategy`] reads the originating table from a
//! header so that many tables routed through one topic keep separate
//! artifacts; [`TopicIdStrategy`] is the plain per-topic naming it falls back
//! to.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::artifact::ArtifactReference;
use crate::cache::ByteContentCache;
use crate::record::RecordMetadata;

/// Header carrying the table identity, as written by the upstream router
pub const DEFAULT_TABLE_ID_HEADER: &str = "__from_table";

static TABLE_ID_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\{"schema":.*,"payload":"(.*)"\}$"#).expect("table id pattern is valid")
});

pub trait ArtifactReferenceStrategy: Send + Sync {
    /// Derive the artifact reference for one message. Never fails.
    fn artifact_reference(&self, metadata: &RecordMetadata) -> ArtifactReference;

    /// Whether the resolver must extract the schema from the payload before
    /// asking for a reference.
    fn load_schema(&self) -> bool {
        true
    }
}

/// `{topic}-{key|value}` with no group
pub fn topic_reference(metadata: &RecordMetadata) -> ArtifactReference {
    ArtifactReference::for_artifact(format!("{}-{}", metadata.topic, metadata.role()))
}

/// Extract the table id from a `{"schema": ..., "payload": "<table>"}`
/// header value. `None` if the bytes do not have that shape.
pub fn extract_table_id(header_value: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(header_value);
    TABLE_ID_PAYLOAD
        .captures(&text)
        .and_then(|captures| captures.get(1))
        .map(|table| table.as_str().to_string())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicIdStrategy;

impl ArtifactReferenceStrategy for TopicIdStrategy {
    fn artifact_reference(&self, metadata: &RecordMetadata) -> ArtifactReference {
        topic_reference(metadata)
    }
}

/// Derives `{table}-{key|value}` from the table-identity header, falling
/// back to the topic when the header is missing or malformed.
pub struct TableIdStrategy {
    header_name: String,
    table_ids: ByteContentCache,
}

impl Default for TableIdStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_ID_HEADER)
    }
}

impl TableIdStrategy {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            table_ids: ByteContentCache::new(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Table id carried by `metadata`, if any
    pub fn table_id(&self, metadata: &RecordMetadata) -> Option<String> {
        let Some(headers) = metadata.headers.as_ref() else {
            warn!(
                topic = %metadata.topic,
                "cannot read table id: record has no headers"
            );
            return None;
        };

        let Some(value) = headers.first(&self.header_name) else {
            warn!(
                topic = %metadata.topic,
                header = %self.header_name,
                "cannot read table id: header not found"
            );
            return None;
        };

        let table_id = self.table_ids.get_or_extract(value, extract_table_id);
        if table_id.is_none() {
            warn!(
                topic = %metadata.topic,
                header = %self.header_name,
                "cannot read table id: header value is not a table payload"
            );
        }
        table_id
    }

    /// Number of distinct header payloads seen so far
    pub fn cached_payloads(&self) -> usize {
        self.table_ids.len()
    }
}

impl ArtifactReferenceStrategy for TableIdStrategy {
    fn artifact_reference(&self, metadata: &RecordMetadata) -> ArtifactReference {
        match self.table_id(metadata) {
            Some(table) => ArtifactReference::for_artifact(format!("{}-{}", table, metadata.role())),
            None => topic_reference(metadata),
        }
    }

    fn load_schema(&self) -> bool {
        false
    }
}
