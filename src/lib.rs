//! CDC Schema Resolver
//!
//! Resolves, caches and optionally registers the schema of every message
//! flowing through a change-data-capture pipeline.
//!
//! ## Features
//!
//! - **Table-based artifact identity**: artifacts are named after the table a
//!   message came from (read from a header), not after the shared topic
//! - **Multi-key cache**: a resolved schema is reachable by global id,
//!   content id, content hash, coordinates and content
//! - **Single-flight registration**: concurrent first sightings of a schema
//!   issue one registry call
//! - **Nested references**: dependencies are registered before dependents
//!   and resolved transitively on fetch
//! - **Topic header enrichment**: derive a header from the topic name
//!
//! ## Flow
//!
//! ```text
//! record ──► ArtifactReferenceStrategy ──► ArtifactReference
//!                                               │
//!                    SchemaCache ◄──────────────┤ probe: global id, content id,
//!                        ▲                      │        content hash, coordinates
//!                        │ index               miss
//!                        │                      ▼
//!                 SchemaResolver ───────► RegistryClient
//!                                  create / fetch / find by content
//! ```

pub mod artifact;
pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod parser;
pub mod record;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod strategy;
pub mod transform;

pub use artifact::{ArtifactCoordinates, ArtifactMetadata, ArtifactReference, ArtifactType, IfExists, ReferenceDescriptor};
pub use cache::{CachedSchema, SchemaCache};
pub use checksum::Checksum;
pub use config::{ResolverConfig, Settings, StrategyConfig, TopicHeaderConfig};
pub use error::{RegistryError, Result, SchemaError};
pub use parser::{AvroRecord, AvroSchemaParser, SchemaParser};
pub use record::{ChangeRecord, Headers, Record, RecordMetadata};
pub use registry::{InMemoryRegistry, RegistryClient};
pub use resolver::SchemaResolver;
pub use schema::{ParsedSchema, SchemaLookupResult};
pub use strategy::{ArtifactReferenceStrategy, TableIdStrategy, TopicIdStrategy};
pub use transform::TopicHeaderTransform;
