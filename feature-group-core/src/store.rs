//! Clients for the remote feature store: control plane, online store runtime and the
//! query engine that reads the offline store.

use crate::model::{
    CreateFeatureGroupRequest, FeatureGroupDescription, QueryExecution, QueryRequest, Record,
};
use crate::table::Table;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod aws;
pub mod memory;

pub use memory::InMemoryFeatureStore;

#[async_trait]
pub trait FeatureGroupService: Send + Sync {
    /// Fails with [`crate::error::FeatureStoreError::FeatureGroupAlreadyExists`] when the
    /// name is taken.
    async fn create_feature_group(&self, request: &CreateFeatureGroupRequest) -> Result<()>;

    /// Fails with [`crate::error::FeatureStoreError::FeatureGroupNotFound`] for unknown names.
    async fn describe_feature_group(&self, name: &str) -> Result<FeatureGroupDescription>;
}

#[async_trait]
pub trait FeatureStoreRuntime: Send + Sync {
    async fn put_record(&self, feature_group_name: &str, record: &Record) -> Result<()>;
}

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Submits a query and returns its execution id.
    async fn start_query(&self, request: &QueryRequest) -> Result<String>;

    async fn get_query_execution(&self, query_execution_id: &str) -> Result<QueryExecution>;

    /// Reads the result set of a succeeded execution.
    async fn fetch_results(&self, execution: &QueryExecution) -> Result<Table>;
}

/// The set of clients a dataset talks to.
#[derive(Clone)]
pub struct Session {
    pub feature_groups: Arc<dyn FeatureGroupService>,
    pub runtime: Arc<dyn FeatureStoreRuntime>,
    pub query_engine: Arc<dyn QueryEngine>,
}

impl Session {
    pub fn new(
        feature_groups: Arc<dyn FeatureGroupService>,
        runtime: Arc<dyn FeatureStoreRuntime>,
        query_engine: Arc<dyn QueryEngine>,
    ) -> Self {
        Self {
            feature_groups,
            runtime,
            query_engine,
        }
    }

    /// Builds the SageMaker / Athena clients from an already resolved SDK configuration.
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::new(
            Arc::new(aws::SageMakerFeatureGroupService::new(config)),
            Arc::new(aws::SageMakerFeatureStoreRuntime::new(config)),
            Arc::new(aws::AthenaQueryEngine::new(config)),
        )
    }

    /// Resolves region and credentials from the environment. `region` overrides the
    /// ambient region when given.
    pub async fn from_env(region: Option<&str>) -> Result<Self> {
        let config = aws::load_sdk_config(region).await?;
        Ok(Self::from_sdk_config(&config))
    }

    pub fn in_memory(store: Arc<InMemoryFeatureStore>) -> Self {
        Self::new(store.clone(), store.clone(), store)
    }
}
