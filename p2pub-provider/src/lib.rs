//! p2pub Provider
//!
//! Read-only data sources for the IIJ GIO P2 public resource API.
//!
//! ## Module Structure
//!
//! - `api` - Remote API seam and its HTTP implementation
//! - `context` - Client and GIS service code shared by data sources
//! - `provider` - P2pubProvider implementation
//! - `system_storage` - System storage selection and its data source

pub mod api;
pub mod context;
pub mod provider;
pub mod system_storage;

// Re-export main types
pub use api::{Credentials, HttpClientConfig, HttpSystemStorageApi, StorageRecord, SystemStorageApi};
pub use context::ProviderContext;
pub use provider::P2pubProvider;
pub use system_storage::{
    FilterCriterion, SelectionError, SelectionRequest, StorageSelector, SystemStorageDataSource,
};
