//! p2pub Core
//!
//! Host contract for read-only infrastructure data sources: attribute values,
//! state, schemas and the provider/data source traits.

pub mod provider;
pub mod resource;
pub mod schema;
