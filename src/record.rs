//! Change records as seen by the resolver: a payload plus read-only
//! transport metadata.

use serde::{Deserialize, Serialize};

/// Ordered multimap of message headers.
///
/// Several headers may share a name; lookups return the first one added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, Vec<u8>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing header with the same name
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Builder-style [`Headers::add`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.add(name, value);
        self
    }

    /// First value stored under `name`
    pub fn first(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    /// All values stored under `name`, in insertion order
    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_slice()))
    }
}

/// Transport metadata of one message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub topic: String,
    /// Whether the payload is the message key rather than its value
    pub is_key: bool,
    /// `None` when the source delivered no header set at all
    pub headers: Option<Headers>,
}

impl RecordMetadata {
    pub fn new(topic: impl Into<String>, is_key: bool) -> Self {
        Self {
            topic: topic.into(),
            is_key,
            headers: Some(Headers::new()),
        }
    }

    pub fn with_headers(mut self, headers: Option<Headers>) -> Self {
        self.headers = headers;
        self
    }

    /// `"key"` or `"value"`, the suffix used in derived artifact ids
    pub fn role(&self) -> &'static str {
        if self.is_key {
            "key"
        } else {
            "value"
        }
    }
}

/// Capability of a source record: metadata plus an optional payload.
///
/// Adapters for each source implement this; the resolver never mutates it.
pub trait Record<T> {
    fn metadata(&self) -> &RecordMetadata;

    fn payload(&self) -> Option<&T>;
}

/// Plain owned record, the default adapter
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord<T> {
    pub metadata: RecordMetadata,
    pub payload: Option<T>,
}

impl<T> ChangeRecord<T> {
    pub fn new(metadata: RecordMetadata, payload: T) -> Self {
        Self {
            metadata,
            payload: Some(payload),
        }
    }

    /// Record carrying no payload (a tombstone)
    pub fn empty(metadata: RecordMetadata) -> Self {
        Self {
            metadata,
            payload: None,
        }
    }
}

impl<T> Record<T> for ChangeRecord<T> {
    fn metadata(&self) -> &RecordMetadata {
        &self.metadata
    }

    fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }
}
