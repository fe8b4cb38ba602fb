//! Process-lifetime caches.
//!
//! Every cache here belongs to one owner instance (a strategy, a transform or
//! a resolver) and is dropped with it; nothing is global or persisted.

pub mod byte_content;
pub mod header_value;
pub mod schema_cache;
pub mod single_flight;

pub use byte_content::ByteContentCache;
pub use header_value::HeaderValueCache;
pub use schema_cache::{CachedSchema, ContentKey, SchemaCache};
pub use single_flight::SingleFlight;
