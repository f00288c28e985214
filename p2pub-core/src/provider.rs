//! Provider - Traits abstracting read-only data sources
//!
//! A Provider groups the data sources of one remote service.
//! A DataSource turns configuration attributes into a single read against
//! that service and reports the result as `State`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::resource::{ResourceId, State, Value};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operation timeouts declared by a data source and enforced by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
}

impl Timeouts {
    pub const DEFAULT_READ: Duration = Duration::from_secs(5 * 60);

    pub fn with_read(mut self, read: Duration) -> Self {
        self.read = read;
        self
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Self::DEFAULT_READ,
        }
    }
}

/// A read-only data source
pub trait DataSource: Send + Sync {
    /// Data source type name (e.g., "p2pub_system_storage")
    fn name(&self) -> &'static str;

    /// Attribute schema covering both configuration and computed attributes
    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Read the remote object selected by `attributes`
    ///
    /// On success the returned State carries the computed attributes and
    /// the remote identifier.
    fn read(
        &self,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Main Provider trait
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "p2pub")
    fn name(&self) -> &'static str;

    /// Data sources this Provider can read
    fn data_sources(&self) -> Vec<Box<dyn DataSource>>;

    /// Look up a data source by type name
    fn data_source(&self, name: &str) -> ProviderResult<Box<dyn DataSource>> {
        self.data_sources()
            .into_iter()
            .find(|ds| ds.name() == name)
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "Unknown data source '{}' for provider {}",
                    name,
                    self.name()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDataSource;

    impl DataSource for MockDataSource {
        fn name(&self) -> &'static str {
            "mock_thing"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("mock_thing")
        }

        fn read(
            &self,
            id: &ResourceId,
            attributes: &HashMap<String, Value>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = attributes.clone();
            Box::pin(async move { Ok(State::new(id, attrs).with_identifier("mock-id-123")) })
        }
    }

    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn data_sources(&self) -> Vec<Box<dyn DataSource>> {
            vec![Box::new(MockDataSource)]
        }
    }

    #[tokio::test]
    async fn mock_data_source_read_returns_state() {
        let ds = MockProvider.data_source("mock_thing").unwrap();
        let id = ResourceId::new("mock_thing", "example");
        let state = ds.read(&id, &HashMap::new()).await.unwrap();
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[test]
    fn unknown_data_source_is_an_error() {
        let err = MockProvider.data_source("nope").err().unwrap();
        assert_eq!(err.to_string(), "Unknown data source 'nope' for provider mock");
    }

    #[test]
    fn default_read_timeout_is_five_minutes() {
        assert_eq!(MockDataSource.timeouts().read, Duration::from_secs(300));
        let t = Timeouts::default().with_read(Duration::from_secs(10));
        assert_eq!(t.read, Duration::from_secs(10));
    }

    #[test]
    fn provider_error_display_includes_resource() {
        let err = ProviderError::new("boom").for_resource(ResourceId::new("t", "n"));
        assert_eq!(err.to_string(), "[t.n] boom");
    }
}
