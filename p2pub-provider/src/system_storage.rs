//! System storage data source
//!
//! Lists the system storages of a GIS contract, narrows them down with the
//! configured filters and exposes the single chosen storage as state.

use std::collections::HashMap;

use p2pub_core::provider::{BoxFuture, DataSource, ProviderError, ProviderResult};
use p2pub_core::resource::{ResourceId, State, Value};
use p2pub_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use regex::Regex;
use thiserror::Error;

use crate::api::{ApiError, StorageRecord};
use crate::context::ProviderContext;

pub const DATA_SOURCE_NAME: &str = "p2pub_system_storage";

/// Why a storage could not be selected
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("failed to list system storages: {0}")]
    Upstream(#[from] ApiError),

    #[error("filter by '{0}' is not supported")]
    UnsupportedFilter(String),

    #[error("no system storages matched")]
    NoMatch,

    #[error("{0} system storages matched, please narrow down the filters or set most_recent")]
    Ambiguous(usize),
}

impl SelectionError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// One `{name, value}` filter entry as given by configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriterion {
    pub name: String,
    pub value: String,
}

impl FilterCriterion {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Compiled form of a `FilterCriterion`
#[derive(Debug)]
enum Filter {
    OsType(String),
    /// Unanchored search over the label; an unparsable pattern matches nothing
    Label(Option<Regex>),
    Type(String),
}

impl Filter {
    fn compile(criterion: &FilterCriterion) -> Result<Self, SelectionError> {
        match criterion.name.as_str() {
            "os_type" => Ok(Filter::OsType(criterion.value.clone())),
            "type" => Ok(Filter::Type(criterion.value.clone())),
            "label" => match Regex::new(&criterion.value) {
                Ok(pattern) => Ok(Filter::Label(Some(pattern))),
                Err(e) => {
                    log::error!("label pattern '{}' is invalid: {}", criterion.value, e);
                    Ok(Filter::Label(None))
                }
            },
            other => {
                log::error!("filter by '{}' not supported", other);
                Err(SelectionError::UnsupportedFilter(other.to_string()))
            }
        }
    }

    fn matches(&self, record: &StorageRecord) -> bool {
        match self {
            Filter::OsType(os_type) => record.os_type == *os_type,
            Filter::Label(pattern) => pattern
                .as_ref()
                .is_some_and(|p| p.is_match(&record.label)),
            Filter::Type(storage_type) => record.storage_type == *storage_type,
        }
    }
}

/// Strongly typed form of the data source configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    pub service_code: Option<String>,
    pub filters: Vec<FilterCriterion>,
    pub most_recent: bool,
}

impl SelectionRequest {
    pub fn by_service_code(service_code: impl Into<String>) -> Self {
        Self {
            service_code: Some(service_code.into()),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(FilterCriterion::new(name, value));
        self
    }

    pub fn with_most_recent(mut self, most_recent: bool) -> Self {
        self.most_recent = most_recent;
        self
    }

    /// The service code, if one was given and is non-empty
    fn service_code(&self) -> Option<&str> {
        self.service_code.as_deref().filter(|code| !code.is_empty())
    }

    pub fn validate(&self) -> Result<(), SelectionError> {
        if self.service_code().is_none() && self.filters.is_empty() {
            return Err(SelectionError::validation(
                "filter or service_code is required",
            ));
        }
        Ok(())
    }

    /// Parse host attributes into a request
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, SelectionError> {
        let service_code = match attributes.get("service_code") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(SelectionError::validation(format!(
                    "service_code must be a String, got {}",
                    other.type_name()
                )));
            }
        };

        let most_recent = match attributes.get("most_recent") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(SelectionError::validation(format!(
                    "most_recent must be a Bool, got {}",
                    other.type_name()
                )));
            }
        };

        let filters = match attributes.get("filter") {
            None => Vec::new(),
            Some(Value::List(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_filter(i, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(SelectionError::validation(format!(
                    "filter must be a List, got {}",
                    other.type_name()
                )));
            }
        };

        Ok(Self {
            service_code,
            filters,
            most_recent,
        })
    }
}

fn parse_filter(index: usize, item: &Value) -> Result<FilterCriterion, SelectionError> {
    let Value::Map(entry) = item else {
        return Err(SelectionError::validation(format!(
            "filter[{}] must be a Map, got {}",
            index,
            item.type_name()
        )));
    };

    let field = |key: &str| {
        entry.get(key).and_then(Value::as_str).ok_or_else(|| {
            SelectionError::validation(format!("filter[{}].{} must be a String", index, key))
        })
    };

    Ok(FilterCriterion::new(field("name")?, field("value")?))
}

/// Picks exactly one storage out of the remote inventory
#[derive(Debug, Clone)]
pub struct StorageSelector {
    context: ProviderContext,
}

impl StorageSelector {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    pub async fn select(&self, request: &SelectionRequest) -> Result<StorageRecord, SelectionError> {
        request.validate()?;

        let records = self.context.list_system_storages().await?;
        log::debug!(
            "fetched {} system storages for {}",
            records.len(),
            self.context.gis_service_code()
        );

        select_from(records, request)
    }
}

/// Apply an already validated `request` to a fetched inventory
fn select_from(
    mut records: Vec<StorageRecord>,
    request: &SelectionRequest,
) -> Result<StorageRecord, SelectionError> {
    if let Some(code) = request.service_code() {
        if let Some(pos) = records.iter().position(|r| r.service_code == code) {
            return Ok(records.swap_remove(pos));
        }
        // An empty filter list matches every record.
        log::debug!("service_code {} not found, falling back to filters", code);
    }

    let filters = request
        .filters
        .iter()
        .map(Filter::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let matches: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, record)| filters.iter().all(|f| f.matches(record)))
        .map(|(idx, _)| idx)
        .collect();
    log::debug!("{} system storages matched", matches.len());

    let picked = match matches.as_slice() {
        [] => return Err(SelectionError::NoMatch),
        [only] => *only,
        many if !request.most_recent => return Err(SelectionError::Ambiguous(many.len())),
        // Smallest start_date wins; the first one in list order on ties.
        many => {
            let picked = many
                .iter()
                .copied()
                .min_by(|a, b| records[*a].start_date.cmp(&records[*b].start_date))
                .unwrap_or(many[0]);
            log::info!(
                "most_recent picked {} out of {} matches",
                records[picked].service_code,
                many.len()
            );
            picked
        }
    };

    Ok(records.swap_remove(picked))
}

/// Map the chosen storage to state attributes
fn record_attributes(record: &StorageRecord) -> HashMap<String, Value> {
    [
        ("os_type", &record.os_type),
        ("created_at", &record.start_date),
        ("label", &record.label),
        ("type", &record.storage_type),
        ("storage_size", &record.storage_size),
        ("storage_group", &record.storage_group),
        ("service_code", &record.service_code),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
    .collect()
}

/// `p2pub_system_storage` data source
#[derive(Debug, Clone)]
pub struct SystemStorageDataSource {
    context: ProviderContext,
}

impl SystemStorageDataSource {
    pub fn new(context: ProviderContext) -> Self {
        Self { context }
    }

    async fn read_storage(
        &self,
        id: ResourceId,
        attributes: HashMap<String, Value>,
    ) -> ProviderResult<State> {
        let schema = self.schema();
        if let Err(errors) = schema.validate(&attributes) {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            let err = SelectionError::validation(messages.join("; "));
            return Err(ProviderError::new(err.to_string()).for_resource(id));
        }

        let request = SelectionRequest::from_attributes(&schema.with_defaults(&attributes))
            .map_err(|e| selection_failed(&id, e))?;

        let record = StorageSelector::new(self.context.clone())
            .select(&request)
            .await
            .map_err(|e| selection_failed(&id, e))?;

        let identifier = record.service_code.clone();
        Ok(State::new(id, record_attributes(&record)).with_identifier(identifier))
    }
}

fn selection_failed(id: &ResourceId, err: SelectionError) -> ProviderError {
    let message = err.to_string();
    ProviderError::new(message)
        .for_resource(id.clone())
        .with_cause(err)
}

/// Returns the schema for the system storage data source
pub fn system_storage_schema() -> ResourceSchema {
    let filter_entry = AttributeType::Object(vec![
        AttributeSchema::new("name", AttributeType::String)
            .required()
            .with_description("Field to filter on: os_type, label or type"),
        AttributeSchema::new("value", AttributeType::String)
            .required()
            .with_description("Exact value, or a regular expression for label"),
    ]);

    ResourceSchema::new(DATA_SOURCE_NAME)
        .with_description("Looks up a single system storage of the GIS contract")
        .attribute(
            AttributeSchema::new("filter", AttributeType::List(Box::new(filter_entry)))
                .with_description("Filters that must all match"),
        )
        .attribute(
            AttributeSchema::new("most_recent", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Pick by start date when several storages match"),
        )
        .attribute(
            AttributeSchema::new("service_code", AttributeType::String)
                .computed()
                .with_description("Service code of the storage; bypasses filters when set"),
        )
        .attribute(
            AttributeSchema::new("os_type", AttributeType::String)
                .computed()
                .with_description("OS type"),
        )
        .attribute(
            AttributeSchema::new("label", AttributeType::String)
                .computed()
                .with_description("Label"),
        )
        .attribute(
            AttributeSchema::new("type", AttributeType::String)
                .computed()
                .with_description("Storage type"),
        )
        .attribute(AttributeSchema::new("storage_size", AttributeType::String).computed())
        .attribute(AttributeSchema::new("storage_group", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("created_at", AttributeType::String)
                .computed()
                .with_description("Start date of the storage contract"),
        )
}

impl DataSource for SystemStorageDataSource {
    fn name(&self) -> &'static str {
        DATA_SOURCE_NAME
    }

    fn schema(&self) -> ResourceSchema {
        system_storage_schema()
    }

    fn read(
        &self,
        id: &ResourceId,
        attributes: &HashMap<String, Value>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let attributes = attributes.clone();
        Box::pin(async move { self.read_storage(id, attributes).await })
    }
}
