//! Shared read context handed to every data source

use std::sync::Arc;

use crate::api::{ApiResult, HttpClientConfig, HttpSystemStorageApi, StorageRecord, SystemStorageApi};

/// API client plus the GIS service code every call is scoped to
#[derive(Clone)]
pub struct ProviderContext {
    api: Arc<dyn SystemStorageApi>,
    gis_service_code: String,
}

impl ProviderContext {
    pub fn new(api: Arc<dyn SystemStorageApi>, gis_service_code: impl Into<String>) -> Self {
        Self {
            api,
            gis_service_code: gis_service_code.into(),
        }
    }

    /// Create a context backed by the HTTP client
    pub fn from_config(
        config: &HttpClientConfig,
        gis_service_code: impl Into<String>,
    ) -> ApiResult<Self> {
        let api = HttpSystemStorageApi::new(config)?;
        Ok(Self::new(Arc::new(api), gis_service_code))
    }

    pub fn gis_service_code(&self) -> &str {
        &self.gis_service_code
    }

    pub async fn list_system_storages(&self) -> ApiResult<Vec<StorageRecord>> {
        self.api.list_system_storages(&self.gis_service_code).await
    }
}

impl std::fmt::Debug for ProviderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderContext")
            .field("gis_service_code", &self.gis_service_code)
            .finish_non_exhaustive()
    }
}
