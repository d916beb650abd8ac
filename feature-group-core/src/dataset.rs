//! Pipeline-facing dataset interface and its feature group implementation.

use crate::config::FeatureGroupConfig;
use crate::error::FeatureStoreError;
use crate::feature_group::FeatureGroup;
use crate::model::CreateFeatureGroupRequest;
use crate::store::Session;
use crate::table::Table;
use crate::util::render_query;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Something a pipeline can save data to and load data from.
#[async_trait]
pub trait Dataset: Send + Sync {
    type Data: Send + Sync;
    type Description: Debug;

    async fn load(&self) -> Result<Self::Data>;

    async fn save(&self, data: &Self::Data) -> Result<()>;

    async fn exists(&self) -> Result<bool>;

    fn describe(&self) -> Self::Description;
}

#[derive(Debug, Clone)]
pub struct DatasetDescription {
    pub feature_group: FeatureGroup,
}

/// Saves tables into a SageMaker feature group and loads them back through its offline
/// store.
pub struct FeatureGroupDataset {
    config: FeatureGroupConfig,
    feature_group: FeatureGroup,
    cancellation: CancellationToken,
}

impl FeatureGroupDataset {
    pub fn new(config: FeatureGroupConfig, session: Session) -> Result<Self> {
        config.validate()?;
        let feature_group = FeatureGroup::new(&config.name, session);
        Ok(Self {
            config,
            feature_group,
            cancellation: CancellationToken::new(),
        })
    }

    /// Builds AWS clients from the environment, honouring the configured region.
    pub async fn from_config(config: FeatureGroupConfig) -> Result<Self> {
        config.validate()?;
        let session = Session::from_env(config.region.as_deref()).await?;
        Self::new(config, session)
    }

    /// Cancelling `token` aborts any wait in progress in `save` or `load`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &FeatureGroupConfig {
        &self.config
    }

    pub fn feature_group(&self) -> &FeatureGroup {
        &self.feature_group
    }
}

#[async_trait]
impl Dataset for FeatureGroupDataset {
    type Data = Table;
    type Description = DatasetDescription;

    async fn load(&self) -> Result<Table> {
        let mut query = self.feature_group.athena_query().await?;
        let query_string = render_query(&self.config.query, query.table_name());
        info!("Running offline store query: {}", query_string);
        query
            .run(&query_string, &self.config.query_output_location())
            .await?;
        query
            .wait(&self.config.query_poll.policy(), &self.cancellation)
            .await?;
        query.as_table().await
    }

    async fn save(&self, data: &Table) -> Result<()> {
        let feature_definitions = data.feature_definitions()?;
        let request = CreateFeatureGroupRequest::try_new(&self.config, feature_definitions)?;
        match self.feature_group.create(&request).await {
            Ok(()) => info!("Creating feature group {}", self.config.name),
            Err(err) if FeatureStoreError::matches(&err, FeatureStoreError::is_already_exists) => {
                info!(
                    "Feature group {} already exists, reusing it",
                    self.config.name
                );
            }
            Err(err) => return Err(err),
        }
        self.feature_group
            .wait_for_creation(&self.config.creation_poll.policy(), &self.cancellation)
            .await?;

        let sample = data.head(self.config.ingest_row_limit);
        let ingested = self.feature_group.ingest(&sample).await?;
        info!(
            "Ingested {} of {} row(s) into feature group {}",
            ingested,
            data.num_rows(),
            self.config.name
        );
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        self.feature_group.exists().await
    }

    fn describe(&self) -> DatasetDescription {
        DatasetDescription {
            feature_group: self.feature_group.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureGroupStatus, FeatureType, QueryState};
    use crate::store::InMemoryFeatureStore;
    use crate::table::{Column, DataType, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const NAME: &str = "spaceflights-shuttles";

    fn config(query: &str) -> FeatureGroupConfig {
        let mut config = FeatureGroupConfig::new(
            NAME,
            "s3://spaceflights-feature-store/offline",
            "id",
            "event_time",
            query,
            "arn:aws:iam::123456789012:role/FeatureStoreRole",
        );
        config.description = Some("Shuttle features".to_string());
        config
    }

    fn dataset(store: &Arc<InMemoryFeatureStore>, query: &str) -> Result<FeatureGroupDataset> {
        FeatureGroupDataset::new(config(query), Session::in_memory(store.clone()))
    }

    fn shuttles(rows: i64) -> Result<Table> {
        Table::try_new(
            vec![
                Column::new("id", DataType::Int64),
                Column::new("engine_type", DataType::Utf8),
                Column::new("event_time", DataType::Float64),
            ],
            (0..rows)
                .map(|id| {
                    vec![
                        Value::from(id),
                        Value::from("Quantum"),
                        Value::from(1_700_000_000.0 + id as f64),
                    ]
                })
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn save_creates_the_feature_group() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT * FROM \"{table_name}\"")?;
        assert!(!dataset.exists().await?);

        dataset.save(&shuttles(3)?).await?;

        let description = dataset.describe().feature_group.describe().await?;
        assert_eq!(description.status, FeatureGroupStatus::Created);
        assert!(dataset.exists().await?);

        let request = store.create_request(NAME)?.expect("group was created");
        assert_eq!(request.record_identifier_feature_name, "id");
        assert_eq!(request.event_time_feature_name, "event_time");
        assert_eq!(
            request.offline_store_s3_uri,
            "s3://spaceflights-feature-store/offline"
        );
        assert_eq!(request.description.as_deref(), Some("Shuttle features"));
        assert!(request.enable_online_store);
        let types = request
            .feature_definitions
            .iter()
            .map(|definition| definition.feature_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![FeatureType::Integral, FeatureType::String, FeatureType::Fractional]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn saving_twice_reuses_the_existing_group() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT 1")?;
        dataset.save(&shuttles(3)?).await?;
        dataset.save(&shuttles(3)?).await?;
        assert_eq!(store.put_count(NAME)?, 6);
        assert_eq!(store.online_records(NAME)?.len(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn save_ingests_only_the_first_ten_rows() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT 1")?;
        dataset.save(&shuttles(15)?).await?;
        assert_eq!(store.put_count(NAME)?, 10);
        let ids = store
            .online_records(NAME)?
            .iter()
            .filter_map(|record| record.get("id").map(str::to_string))
            .collect::<Vec<_>>();
        assert!(!ids.contains(&"10".to_string()));
        assert!(ids.contains(&"9".to_string()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn save_waits_while_the_group_is_creating() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        store.script_statuses(
            NAME,
            [
                FeatureGroupStatus::Creating,
                FeatureGroupStatus::Creating,
                FeatureGroupStatus::Created,
            ],
        )?;
        let dataset = dataset(&store, "SELECT 1")?;
        let started = tokio::time::Instant::now();
        dataset.save(&shuttles(2)?).await?;
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(store.put_count(NAME)?, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_creation_names_the_group() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        store.script_statuses(
            NAME,
            [FeatureGroupStatus::Creating, FeatureGroupStatus::CreateFailed],
        )?;
        let dataset = dataset(&store, "SELECT 1")?;
        let err = dataset.save(&shuttles(2)?).await.unwrap_err();
        assert!(err.to_string().contains(NAME));
        assert_eq!(store.put_count(NAME)?, 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn other_creation_errors_propagate() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        store.fail_next_create(NAME, "ResourceLimitExceeded: too many feature groups")?;
        let dataset = dataset(&store, "SELECT 1")?;
        let err = dataset.save(&shuttles(2)?).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "ResourceLimitExceeded: too many feature groups"
        );
        assert!(!dataset.exists().await?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn save_rejects_tables_without_event_time() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT 1")?;
        let table = Table::try_new(
            vec![Column::new("id", DataType::Int64)],
            vec![vec![Value::from(1)]],
        )?;
        let err = dataset.save(&table).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<FeatureStoreError>(),
            Some(&FeatureStoreError::missing_feature(NAME, "event_time"))
        );
        assert!(!dataset.exists().await?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn creation_wait_is_bounded_and_cancellable() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        store.script_statuses(NAME, vec![FeatureGroupStatus::Creating; 100])?;
        let mut bounded = config("SELECT 1");
        bounded.creation_poll.max_attempts = Some(3);
        let dataset = FeatureGroupDataset::new(bounded, Session::in_memory(store.clone()))?;
        let err = dataset.save(&shuttles(1)?).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeatureStoreError>(),
            Some(FeatureStoreError::PollTimedOut { attempts: 3, .. })
        ));

        let token = CancellationToken::new();
        token.cancel();
        let cancelled = dataset.with_cancellation(token);
        let err = cancelled.save(&shuttles(1)?).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeatureStoreError>(),
            Some(FeatureStoreError::Cancelled { .. })
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_renders_the_offline_table_name() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT * FROM \"{table_name}\" LIMIT 1")?;
        dataset.save(&shuttles(1)?).await?;
        let table_name = dataset
            .feature_group()
            .describe()
            .await?
            .offline_store
            .map(|catalog| catalog.table_name)
            .expect("offline store is configured");
        let rendered = format!("SELECT * FROM \"{}\" LIMIT 1", table_name);
        let expected = shuttles(1)?;
        store.register_query_result(&rendered, expected.clone())?;
        store.queue_query_states([QueryState::Queued, QueryState::Running])?;

        let loaded = dataset.load().await?;

        assert_eq!(loaded, expected);
        let submitted = store.submitted_queries()?;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].query_string, rendered);
        assert_eq!(submitted[0].database, "sagemaker_featurestore");
        assert_eq!(
            submitted[0].output_location,
            "s3://spaceflights-feature-store/offline/query_results/"
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn load_propagates_query_failures() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT missing FROM \"{table_name}\"")?;
        dataset.save(&shuttles(1)?).await?;
        let err = dataset.load().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FeatureStoreError>(),
            Some(FeatureStoreError::QueryFailed {
                state: QueryState::Failed,
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn load_needs_the_group_to_exist() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let dataset = dataset(&store, "SELECT 1")?;
        let err = dataset.load().await.unwrap_err();
        assert!(FeatureStoreError::matches(&err, FeatureStoreError::is_not_found));
        assert!(store.submitted_queries()?.is_empty());
        Ok(())
    }

    #[test]
    fn construction_validates_the_config() {
        let store = Arc::new(InMemoryFeatureStore::new());
        let mut invalid = config("SELECT 1");
        invalid.role_arn = String::new();
        assert!(FeatureGroupDataset::new(invalid, Session::in_memory(store)).is_err());
    }

    #[test]
    fn describe_exposes_the_feature_group() -> Result<()> {
        let store = Arc::new(InMemoryFeatureStore::new());
        let description = dataset(&store, "SELECT 1")?.describe();
        assert_eq!(description.feature_group.name(), NAME);
        assert!(format!("{:?}", description).contains(NAME));
        Ok(())
    }
}
