//! Artifact identity types shared by the strategy, the resolver and the
//! registry client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Type of artifact stored in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    /// Apache AVRO schemas
    Avro,
    /// Protocol buffer definitions
    Protobuf,
    /// JSON Schema definitions
    Json,
    /// Kafka Connect JSON converter schemas
    Kconnect,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Avro => "AVRO",
            ArtifactType::Protobuf => "PROTOBUF",
            ArtifactType::Json => "JSON",
            ArtifactType::Kconnect => "KCONNECT",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the registry does when asked to create an artifact that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IfExists {
    /// Reject the request
    Fail,
    /// Always create a new version
    Update,
    /// Return the latest existing version untouched
    Return,
    /// Return the latest version if its content is identical, otherwise
    /// create a new version
    #[default]
    ReturnOrUpdate,
}

impl IfExists {
    pub fn as_str(&self) -> &'static str {
        match self {
            IfExists::Fail => "FAIL",
            IfExists::Update => "UPDATE",
            IfExists::Return => "RETURN",
            IfExists::ReturnOrUpdate => "RETURN_OR_UPDATE",
        }
    }
}

impl FromStr for IfExists {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FAIL" => Ok(IfExists::Fail),
            "UPDATE" => Ok(IfExists::Update),
            "RETURN" => Ok(IfExists::Return),
            "RETURN_OR_UPDATE" => Ok(IfExists::ReturnOrUpdate),
            other => Err(SchemaError::Configuration(format!(
                "unknown auto-register-if-exists policy: {other}"
            ))),
        }
    }
}

/// Identity of a schema artifact within the registry namespace.
///
/// The strategy fills `group_id`/`artifact_id`/`version`; the resolved
/// identifiers are only present when a caller already knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl ArtifactReference {
    /// Reference addressed by artifact id only.
    pub fn for_artifact(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_id: Some(artifact_id.into()),
            ..Self::default()
        }
    }

    pub fn for_global_id(global_id: i64) -> Self {
        Self {
            global_id: Some(global_id),
            ..Self::default()
        }
    }

    pub fn for_content_id(content_id: i64) -> Self {
        Self {
            content_id: Some(content_id),
            ..Self::default()
        }
    }

    pub fn for_content_hash(content_hash: impl Into<String>) -> Self {
        Self {
            content_hash: Some(content_hash.into()),
            ..Self::default()
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Whether at least one identifier usable for a lookup is set
    pub fn is_addressable(&self) -> bool {
        self.artifact_id.as_deref().is_some_and(|id| !id.is_empty())
            || self.global_id.is_some()
            || self.content_id.is_some()
            || self.content_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    /// Coordinates of this reference, if it names an artifact
    pub fn coordinates(&self) -> Option<ArtifactCoordinates> {
        let artifact_id = self.artifact_id.as_deref().filter(|id| !id.is_empty())?;
        Some(ArtifactCoordinates::new(
            self.group_id.clone(),
            artifact_id,
            self.version.clone(),
        ))
    }
}

/// The (group, artifact, version) triple identifying an artifact slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactCoordinates {
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: Option<String>,
}

impl ArtifactCoordinates {
    pub fn new(
        group_id: Option<String>,
        artifact_id: impl Into<String>,
        version: Option<String>,
    ) -> Self {
        Self {
            group_id,
            artifact_id: artifact_id.into(),
            version,
        }
    }
}

impl fmt::Display for ArtifactCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.group_id.as_deref().unwrap_or("default"),
            self.artifact_id,
            self.version.as_deref().unwrap_or("latest")
        )
    }
}

/// Metadata the registry returns for an artifact version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub artifact_id: String,
    pub version: String,
    pub global_id: i64,
    pub content_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
}

/// A named dependency of one artifact version on another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Name the parent schema uses for this dependency
    pub name: String,
}
