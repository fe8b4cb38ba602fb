//! Topic-name header enrichment.
//!
//! [`TopicHeaderTransform`] matches a record's topic against a regex and
//! adds a header whose value is built from the match. The format string is
//! copied as is, except that `$n` inserts capture group `n` (`$0` is the
//! whole topic) and `\` makes the next character literal:
//!
//! ```text
//! topic-regex          mimic4demo.(.*)
//! header-value-format  __$1
//! topic                mimic4demo.mimiciv_hosp.patients
//! header value         __mimiciv_hosp.patients
//! ```

use regex::Regex;
use tracing::{debug, warn};

use crate::cache::HeaderValueCache;
use crate::config::TopicHeaderConfig;
use crate::error::{Result, SchemaError};
use crate::record::{ChangeRecord, Headers};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Group(usize),
}

/// Split a format string into literals and group references. Fails on a
/// `$` that is not followed by a digit naming an existing group.
fn compile_format(format: &str, groups: usize) -> std::result::Result<Vec<Part>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    literal.push(escaped);
                }
            }
            '$' => {
                let index = chars
                    .next()
                    .and_then(|d| d.to_digit(10))
                    .map(|d| d as usize)
                    .filter(|d| *d <= groups)
                    .ok_or_else(|| format!("`$` must be followed by a group index from 0 to {groups}"))?;
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(Part::Group(index));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        parts.push(Part::Literal(literal));
    }
    Ok(parts)
}

pub struct TopicHeaderTransform {
    topic_regex: Regex,
    header_name: String,
    format: String,
    parts: std::result::Result<Vec<Part>, String>,
    values: HeaderValueCache,
}

impl TopicHeaderTransform {
    /// Fails if the regex does not compile or the cache size is zero. A bad
    /// format string is not an error here; it only stops headers from being
    /// added.
    pub fn new(config: &TopicHeaderConfig) -> Result<Self> {
        if config.topic_regex.is_empty() || config.header_name.is_empty() {
            return Err(SchemaError::Configuration(
                "topic-regex and header-name must not be empty".to_string(),
            ));
        }

        let topic_regex = Regex::new(&format!("^(?:{})$", config.topic_regex)).map_err(|e| {
            SchemaError::Configuration(format!("invalid topic-regex {}: {e}", config.topic_regex))
        })?;
        let groups = topic_regex.captures_len() - 1;

        Ok(Self {
            parts: compile_format(&config.header_value_format, groups),
            topic_regex,
            header_name: config.header_name.clone(),
            format: config.header_value_format.clone(),
            values: HeaderValueCache::new(config.cache_size)?,
        })
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Header value for `topic`, or `None` if the topic does not match or
    /// the format string is unusable.
    pub fn header_value(&self, topic: &str) -> Option<String> {
        if let Some(value) = self.values.get(topic) {
            return Some(value);
        }

        let captures = self.topic_regex.captures(topic)?;
        let parts = match &self.parts {
            Ok(parts) => parts,
            Err(reason) => {
                warn!(format = %self.format, %reason, "cannot build header value, no header added");
                return None;
            }
        };

        let mut value = String::new();
        for part in parts {
            match part {
                Part::Literal(text) => value.push_str(text),
                Part::Group(index) => {
                    if let Some(group) = captures.get(*index) {
                        value.push_str(group.as_str());
                    }
                }
            }
        }

        self.values.put(topic, value.clone());
        Some(value)
    }

    /// Return `record` with the derived header appended. Records whose
    /// topic yields no value come back unchanged.
    pub fn apply<T>(&self, mut record: ChangeRecord<T>) -> ChangeRecord<T> {
        let Some(value) = self.header_value(&record.metadata.topic) else {
            return record;
        };

        debug!(topic = %record.metadata.topic, header = %self.header_name, %value, "adding topic header");
        record
            .metadata
            .headers
            .get_or_insert_with(Headers::new)
            .add(self.header_name.as_str(), value.into_bytes());
        record
    }

    /// Number of topics whose value is memoized
    pub fn cached_topics(&self) -> usize {
        self.values.len()
    }
}
