use crate::error::FeatureStoreError;
use crate::model::{
    CreateFeatureGroupRequest, DataCatalog, FeatureDefinition, FeatureGroupDescription,
    FeatureGroupStatus, QueryExecution, QueryRequest, QueryState, Record,
};
use crate::store::{FeatureGroupService, FeatureStoreRuntime, QueryEngine};
use crate::table::Table;
use crate::util::parse_s3_url;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_athena::types::{QueryExecutionContext, ResultConfiguration};
use aws_sdk_sagemaker::config::Region;
use aws_sdk_sagemaker::types::{
    DataCatalogConfig, FeatureDefinition as SdkFeatureDefinition, FeatureType as SdkFeatureType,
    OfflineStoreConfig, OnlineStoreConfig, S3StorageConfig,
};
use aws_sdk_sagemakerfeaturestoreruntime::types::FeatureValue as SdkFeatureValue;
use tracing::debug;

/// Loads the shared AWS configuration and makes sure both a region and credentials resolve.
pub async fn load_sdk_config(region: Option<&str>) -> Result<SdkConfig> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_owned()));
    }
    let config = loader.load().await;
    let region = config.region().ok_or_else(|| {
        anyhow!("No AWS region configured, set `region` in the config or AWS_REGION")
    })?;
    let credentials = config
        .credentials_provider()
        .ok_or_else(|| anyhow!("No AWS credentials provider configured"))?;
    credentials
        .provide_credentials()
        .await
        .context("Failed to resolve AWS credentials")?;
    debug!("Resolved AWS configuration for region {}", region);
    Ok(config)
}

pub struct SageMakerFeatureGroupService {
    client: aws_sdk_sagemaker::Client,
}

impl SageMakerFeatureGroupService {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sagemaker::Client::new(config),
        }
    }
}

fn to_sdk_feature_definition(definition: &FeatureDefinition) -> SdkFeatureDefinition {
    SdkFeatureDefinition::builder()
        .feature_name(&definition.feature_name)
        .feature_type(SdkFeatureType::from(definition.feature_type.as_str()))
        .build()
}

fn to_data_catalog(name: &str, config: &DataCatalogConfig) -> Result<DataCatalog> {
    let field = |value: Option<&str>, label: &str| {
        value.map(str::to_string).ok_or_else(|| {
            anyhow!(
                "Offline store catalog of feature group {} has no {}",
                name,
                label
            )
        })
    };
    Ok(DataCatalog {
        catalog: field(config.catalog(), "catalog")?,
        database: field(config.database(), "database")?,
        table_name: field(config.table_name(), "table name")?,
    })
}

#[async_trait]
impl FeatureGroupService for SageMakerFeatureGroupService {
    async fn create_feature_group(&self, request: &CreateFeatureGroupRequest) -> Result<()> {
        let feature_definitions = request
            .feature_definitions
            .iter()
            .map(to_sdk_feature_definition)
            .collect::<Vec<_>>();
        let offline_store_config = OfflineStoreConfig::builder()
            .s3_storage_config(
                S3StorageConfig::builder()
                    .s3_uri(&request.offline_store_s3_uri)
                    .build(),
            )
            .build();
        let online_store_config = OnlineStoreConfig::builder()
            .enable_online_store(request.enable_online_store)
            .build();

        let result = self
            .client
            .create_feature_group()
            .feature_group_name(&request.feature_group_name)
            .record_identifier_feature_name(&request.record_identifier_feature_name)
            .event_time_feature_name(&request.event_time_feature_name)
            .set_feature_definitions(Some(feature_definitions))
            .offline_store_config(offline_store_config)
            .online_store_config(online_store_config)
            .role_arn(&request.role_arn)
            .set_description(request.description.clone())
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_in_use()) => {
                Err(FeatureStoreError::feature_group_already_exists(&request.feature_group_name).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn describe_feature_group(&self, name: &str) -> Result<FeatureGroupDescription> {
        let output = match self
            .client
            .describe_feature_group()
            .feature_group_name(name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_resource_not_found()) => {
                return Err(FeatureStoreError::feature_group_not_found(name).into());
            }
            Err(err) => return Err(err.into()),
        };
        let status = output
            .feature_group_status()
            .map(|status| FeatureGroupStatus::from(status.as_str()))
            .ok_or_else(|| anyhow!("DescribeFeatureGroup returned no status for {}", name))?;
        let offline_store = output
            .offline_store_config()
            .and_then(|config| config.data_catalog_config())
            .map(|catalog| to_data_catalog(name, catalog))
            .transpose()?;
        Ok(FeatureGroupDescription {
            name: name.to_string(),
            status,
            failure_reason: output.failure_reason().map(str::to_string),
            offline_store,
        })
    }
}

pub struct SageMakerFeatureStoreRuntime {
    client: aws_sdk_sagemakerfeaturestoreruntime::Client,
}

impl SageMakerFeatureStoreRuntime {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sagemakerfeaturestoreruntime::Client::new(config),
        }
    }
}

#[async_trait]
impl FeatureStoreRuntime for SageMakerFeatureStoreRuntime {
    async fn put_record(&self, feature_group_name: &str, record: &Record) -> Result<()> {
        let values = record
            .values
            .iter()
            .map(|value| {
                SdkFeatureValue::builder()
                    .feature_name(&value.feature_name)
                    .value_as_string(&value.value_as_string)
                    .build()
            })
            .collect::<Vec<_>>();
        self.client
            .put_record()
            .feature_group_name(feature_group_name)
            .set_record(Some(values))
            .send()
            .await?;
        Ok(())
    }
}

/// Runs queries with Athena and reads their CSV output back from S3.
pub struct AthenaQueryEngine {
    athena: aws_sdk_athena::Client,
    s3: aws_sdk_s3::Client,
}

impl AthenaQueryEngine {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            athena: aws_sdk_athena::Client::new(config),
            s3: aws_sdk_s3::Client::new(config),
        }
    }
}

#[async_trait]
impl QueryEngine for AthenaQueryEngine {
    async fn start_query(&self, request: &QueryRequest) -> Result<String> {
        let context = QueryExecutionContext::builder()
            .catalog(&request.catalog)
            .database(&request.database)
            .build();
        let result_configuration = ResultConfiguration::builder()
            .output_location(&request.output_location)
            .build();
        let output = self
            .athena
            .start_query_execution()
            .query_string(&request.query_string)
            .query_execution_context(context)
            .result_configuration(result_configuration)
            .send()
            .await?;
        output
            .query_execution_id()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Athena returned no query execution id"))
    }

    async fn get_query_execution(&self, query_execution_id: &str) -> Result<QueryExecution> {
        let output = self
            .athena
            .get_query_execution()
            .query_execution_id(query_execution_id)
            .send()
            .await?;
        let execution = output.query_execution().ok_or_else(|| {
            anyhow!("Athena returned no execution for query {}", query_execution_id)
        })?;
        let status = execution.status();
        let state = match status.and_then(|status| status.state()) {
            Some(state) => QueryState::try_from(state.as_str())?,
            None => QueryState::Queued,
        };
        Ok(QueryExecution {
            query_execution_id: query_execution_id.to_string(),
            state,
            state_change_reason: status
                .and_then(|status| status.state_change_reason())
                .map(str::to_string),
            output_location: execution
                .result_configuration()
                .and_then(|config| config.output_location())
                .map(str::to_string),
        })
    }

    async fn fetch_results(&self, execution: &QueryExecution) -> Result<Table> {
        let output_location = execution.output_location.as_deref().ok_or_else(|| {
            anyhow!(
                "Query {} has no output location",
                execution.query_execution_id
            )
        })?;
        let (bucket, key) = parse_s3_url(output_location)?;
        debug!("Reading query results from s3://{}/{}", bucket, key);
        let result_file = self
            .s3
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        let data = result_file.body.collect().await?.into_bytes();
        Table::from_csv_reader(&*data).with_context(|| {
            format!(
                "Failed to parse results of query {}",
                execution.query_execution_id
            )
        })
    }
}
