//! p2pub Provider implementation
//!
//! Groups the data sources that read from the IIJ GIO P2 public resource API.

use p2pub_core::provider::{DataSource, Provider};

use crate::context::ProviderContext;
use crate::system_storage::SystemStorageDataSource;

/// p2pub Provider
#[derive(Debug, Clone)]
pub struct P2pubProvider {
    context: ProviderContext,
}

impl P2pubProvider {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }
}

impl Provider for P2pubProvider {
    fn name(&self) -> &'static str {
        "p2pub"
    }

    fn data_sources(&self) -> Vec<Box<dyn DataSource>> {
        vec![Box::new(SystemStorageDataSource::new(self.context.clone()))]
    }
}
