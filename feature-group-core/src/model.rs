use crate::config::FeatureGroupConfig;
use crate::error::FeatureStoreError;
use anyhow::Result;
use std::fmt;
use std::fmt::Formatter;

/// Value type of a feature as the feature store understands it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Integral,
    Fractional,
    String,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Integral => "Integral",
            FeatureType::Fractional => "Fractional",
            FeatureType::String => "String",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureDefinition {
    pub feature_name: String,
    pub feature_type: FeatureType,
}

impl FeatureDefinition {
    pub fn new(feature_name: impl Into<String>, feature_type: FeatureType) -> Self {
        Self {
            feature_name: feature_name.into(),
            feature_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeatureGroupStatus {
    Creating,
    Created,
    CreateFailed,
    Deleting,
    DeleteFailed,
    Unknown(String),
}

impl FeatureGroupStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FeatureGroupStatus::Creating => "Creating",
            FeatureGroupStatus::Created => "Created",
            FeatureGroupStatus::CreateFailed => "CreateFailed",
            FeatureGroupStatus::Deleting => "Deleting",
            FeatureGroupStatus::DeleteFailed => "DeleteFailed",
            FeatureGroupStatus::Unknown(other) => other.as_str(),
        }
    }
}

impl From<&str> for FeatureGroupStatus {
    fn from(value: &str) -> Self {
        match value {
            "Creating" => FeatureGroupStatus::Creating,
            "Created" => FeatureGroupStatus::Created,
            "CreateFailed" => FeatureGroupStatus::CreateFailed,
            "Deleting" => FeatureGroupStatus::Deleting,
            "DeleteFailed" => FeatureGroupStatus::DeleteFailed,
            other => FeatureGroupStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for FeatureGroupStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Glue data catalog coordinates of a feature group's offline store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataCatalog {
    pub catalog: String,
    pub database: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGroupDescription {
    pub name: String,
    pub status: FeatureGroupStatus,
    pub failure_reason: Option<String>,
    pub offline_store: Option<DataCatalog>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFeatureGroupRequest {
    pub feature_group_name: String,
    pub record_identifier_feature_name: String,
    pub event_time_feature_name: String,
    pub feature_definitions: Vec<FeatureDefinition>,
    pub offline_store_s3_uri: String,
    pub enable_online_store: bool,
    pub role_arn: String,
    pub description: Option<String>,
}

impl CreateFeatureGroupRequest {
    /// Builds the create request for `config`, checking that the record identifier and
    /// event time columns are among `feature_definitions`.
    pub fn try_new(
        config: &FeatureGroupConfig,
        feature_definitions: Vec<FeatureDefinition>,
    ) -> Result<Self> {
        let find = |feature: &str| {
            feature_definitions
                .iter()
                .find(|definition| definition.feature_name == feature)
                .ok_or_else(|| FeatureStoreError::missing_feature(&config.name, feature))
        };
        find(&config.record_identifier_name)?;
        let event_time = find(&config.event_time_name)?;
        if event_time.feature_type == FeatureType::Integral {
            return Err(FeatureStoreError::InvalidEventTimeType {
                feature: event_time.feature_name.clone(),
                feature_type: event_time.feature_type,
            }
            .into());
        }
        Ok(Self {
            feature_group_name: config.name.clone(),
            record_identifier_feature_name: config.record_identifier_name.clone(),
            event_time_feature_name: config.event_time_name.clone(),
            feature_definitions,
            offline_store_s3_uri: config.s3_uri.clone(),
            enable_online_store: true,
            role_arn: config.role_arn.clone(),
            description: config.description.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureValue {
    pub feature_name: String,
    pub value_as_string: String,
}

/// One row as written to the online store. Null cells have no entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub values: Vec<FeatureValue>,
}

impl Record {
    pub fn get(&self, feature_name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|value| value.feature_name == feature_name)
            .map(|value| value.value_as_string.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, QueryState::Queued | QueryState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Queued => "QUEUED",
            QueryState::Running => "RUNNING",
            QueryState::Succeeded => "SUCCEEDED",
            QueryState::Failed => "FAILED",
            QueryState::Cancelled => "CANCELLED",
        }
    }
}

impl TryFrom<&str> for QueryState {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "QUEUED" => Ok(QueryState::Queued),
            "RUNNING" => Ok(QueryState::Running),
            "SUCCEEDED" => Ok(QueryState::Succeeded),
            "FAILED" => Ok(QueryState::Failed),
            "CANCELLED" => Ok(QueryState::Cancelled),
            other => Err(anyhow::anyhow!("Unknown query state {}", other)),
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query_string: String,
    pub catalog: String,
    pub database: String,
    pub output_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExecution {
    pub query_execution_id: String,
    pub state: QueryState,
    pub state_change_reason: Option<String>,
    /// Full location of the result file, once the engine has assigned one.
    pub output_location: Option<String>,
}
