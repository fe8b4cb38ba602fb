//! Checksum utilities for registry content hashes

use sha2::{Sha256, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 checksum of raw schema content, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from JSON value (canonicalized)
    pub fn from_json(value: &serde_json::Value) -> Self {
        // serde_json maps are ordered, so serializing yields sorted keys
        let canonical = serde_json::to_string(value).unwrap_or_default();
        Self::from_bytes(canonical.as_bytes())
    }

    /// Canonical checksum of raw content.
    ///
    /// Content that parses as JSON is hashed in canonical form so that
    /// whitespace and key order do not matter; anything else is hashed as is.
    pub fn canonical(data: &[u8]) -> Self {
        match serde_json::from_slice::<serde_json::Value>(data) {
            Ok(value) => Self::from_json(&value),
            Err(_) => Self::from_bytes(data),
        }
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        self.0 == Self::from_bytes(data).0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<Checksum> for String {
    fn from(c: Checksum) -> Self {
        c.0
    }
}
