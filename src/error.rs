//! Error types for schema resolution

use thiserror::Error;

/// Result type for schema resolution operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Failures reported by a registry client.
///
/// Every variant is fatal to the in-flight resolution; no retry happens at
/// this layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")]
    Unavailable(String),

    #[error("not found in registry: {0}")]
    NotFound(String),

    #[error("artifact already exists: {0}")]
    Conflict(String),

    #[error("registry responded with HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

/// Schema resolver errors
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid artifact reference: {0}")]
    InvalidReference(String),

    #[error("Registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SchemaError {
    fn from(err: std::io::Error) -> Self {
        SchemaError::Io(err.to_string())
    }
}

impl From<config_crate::ConfigError> for SchemaError {
    fn from(err: config_crate::ConfigError) -> Self {
        SchemaError::Config(err.to_string())
    }
}

impl From<apache_avro::Error> for SchemaError {
    fn from(err: apache_avro::Error) -> Self {
        SchemaError::SchemaParse(err.to_string())
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::SchemaParse(err.to_string())
    }
}
