//! Handle on a single remote feature group and on queries against its offline store.

use crate::error::FeatureStoreError;
use crate::model::{
    CreateFeatureGroupRequest, DataCatalog, FeatureGroupDescription, FeatureGroupStatus,
    QueryExecution, QueryRequest, QueryState,
};
use crate::poll::{PollPolicy, poll_until};
use crate::store::{QueryEngine, Session};
use crate::table::Table;
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct FeatureGroup {
    name: String,
    session: Session,
}

impl fmt::Debug for FeatureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureGroup")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FeatureGroup {
    pub fn new(name: impl Into<String>, session: Session) -> Self {
        Self {
            name: name.into(),
            session,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn describe(&self) -> Result<FeatureGroupDescription> {
        self.session
            .feature_groups
            .describe_feature_group(&self.name)
            .await
    }

    pub async fn exists(&self) -> Result<bool> {
        match self.describe().await {
            Ok(_) => Ok(true),
            Err(err) if FeatureStoreError::matches(&err, FeatureStoreError::is_not_found) => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn create(&self, request: &CreateFeatureGroupRequest) -> Result<()> {
        if request.feature_group_name != self.name {
            return Err(anyhow!(
                "Create request for {} sent to feature group {}",
                request.feature_group_name,
                self.name
            ));
        }
        self.session
            .feature_groups
            .create_feature_group(request)
            .await
    }

    /// Polls until the group leaves `Creating`. Any status other than `Created` is an error.
    pub async fn wait_for_creation(
        &self,
        policy: &PollPolicy,
        cancellation: &CancellationToken,
    ) -> Result<FeatureGroupDescription> {
        let operation = format!("feature group {} creation", self.name);
        let description =
            poll_until(policy, cancellation, &operation, || self.check_created()).await?;
        info!("Feature group {} successfully created", self.name);
        Ok(description)
    }

    async fn check_created(&self) -> Result<Option<FeatureGroupDescription>> {
        let description = self.describe().await?;
        match description.status {
            FeatureGroupStatus::Creating => {
                info!("Waiting for feature group {} creation", self.name);
                Ok(None)
            }
            FeatureGroupStatus::Created => Ok(Some(description)),
            status => Err(FeatureStoreError::creation_failed(
                &self.name,
                status,
                description.failure_reason,
            )
            .into()),
        }
    }

    /// Writes every row of `table` to the online store, one record per row.
    ///
    /// All rows are attempted; if any fail the error lists their indices.
    pub async fn ingest(&self, table: &Table) -> Result<usize> {
        let mut ingested = 0;
        let mut failed_rows = vec![];
        for (row_idx, record) in table.records().enumerate() {
            match self.session.runtime.put_record(&self.name, &record).await {
                Ok(()) => ingested += 1,
                Err(err) => {
                    warn!(
                        "Failed to ingest row {} into feature group {}: {:#}",
                        row_idx, self.name, err
                    );
                    failed_rows.push(row_idx);
                }
            }
        }
        if !failed_rows.is_empty() {
            return Err(FeatureStoreError::IngestionFailed {
                name: self.name.clone(),
                failed_rows,
            }
            .into());
        }
        Ok(ingested)
    }

    /// Query handle scoped to the group's offline store table.
    pub async fn athena_query(&self) -> Result<OfflineQuery> {
        let description = self.describe().await?;
        let catalog = description
            .offline_store
            .ok_or_else(|| FeatureStoreError::offline_store_unavailable(&self.name))?;
        Ok(OfflineQuery::new(
            self.session.query_engine.clone(),
            catalog,
        ))
    }
}

pub struct OfflineQuery {
    engine: Arc<dyn QueryEngine>,
    catalog: DataCatalog,
    query_execution_id: Option<String>,
}

impl fmt::Debug for OfflineQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineQuery")
            .field("catalog", &self.catalog)
            .field("query_execution_id", &self.query_execution_id)
            .finish_non_exhaustive()
    }
}

impl OfflineQuery {
    pub fn new(engine: Arc<dyn QueryEngine>, catalog: DataCatalog) -> Self {
        Self {
            engine,
            catalog,
            query_execution_id: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.catalog.table_name
    }

    pub fn database(&self) -> &str {
        &self.catalog.database
    }

    pub async fn run(&mut self, query_string: &str, output_location: &str) -> Result<String> {
        let request = QueryRequest {
            query_string: query_string.to_string(),
            catalog: self.catalog.catalog.clone(),
            database: self.catalog.database.clone(),
            output_location: output_location.to_string(),
        };
        let query_execution_id = self.engine.start_query(&request).await?;
        info!("Started query {}", query_execution_id);
        self.query_execution_id = Some(query_execution_id.clone());
        Ok(query_execution_id)
    }

    fn current_execution_id(&self) -> Result<&str> {
        self.query_execution_id
            .as_deref()
            .ok_or_else(|| anyhow!("No query has been run on table {}", self.table_name()))
    }

    /// Polls until the query is no longer queued or running.
    pub async fn wait(
        &self,
        policy: &PollPolicy,
        cancellation: &CancellationToken,
    ) -> Result<QueryExecution> {
        let query_execution_id = self.current_execution_id()?;
        let operation = format!("query {}", query_execution_id);
        poll_until(policy, cancellation, &operation, || {
            self.check_finished(query_execution_id)
        })
        .await
    }

    async fn check_finished(&self, query_execution_id: &str) -> Result<Option<QueryExecution>> {
        let execution = self.engine.get_query_execution(query_execution_id).await?;
        Ok(execution.state.is_finished().then_some(execution))
    }

    /// Result set of the last run query, which must have succeeded.
    pub async fn as_table(&self) -> Result<Table> {
        let query_execution_id = self.current_execution_id()?;
        let execution = self.engine.get_query_execution(query_execution_id).await?;
        match execution.state {
            QueryState::Succeeded => self.engine.fetch_results(&execution).await,
            QueryState::Queued | QueryState::Running => Err(anyhow!(
                "Query {} is still being executed",
                query_execution_id
            )),
            state => Err(FeatureStoreError::QueryFailed {
                query_execution_id: query_execution_id.to_string(),
                state,
                reason: execution.state_change_reason,
            }
            .into()),
        }
    }
}
