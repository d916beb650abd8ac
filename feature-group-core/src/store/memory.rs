//! In-process feature store. Behaves like the managed service closely enough to run a
//! dataset end to end without AWS: groups go through `Creating` before `Created`, the
//! online store keeps the latest record per identifier and queries are answered from
//! results registered up front.

use crate::error::FeatureStoreError;
use crate::model::{
    CreateFeatureGroupRequest, DataCatalog, FeatureGroupDescription, FeatureGroupStatus,
    QueryExecution, QueryRequest, QueryState, Record,
};
use crate::store::{FeatureGroupService, FeatureStoreRuntime, QueryEngine};
use crate::table::Table;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const DEFAULT_CATALOG: &str = "AwsDataCatalog";
pub const DEFAULT_DATABASE: &str = "sagemaker_featurestore";

struct StoredFeatureGroup {
    request: CreateFeatureGroupRequest,
    status: FeatureGroupStatus,
    failure_reason: Option<String>,
    offline_table_name: String,
    online_records: BTreeMap<String, Record>,
    put_count: usize,
}

enum QueryOutcome {
    Rows(Table),
    Failure(String),
}

struct StoredQuery {
    request: QueryRequest,
    pending_states: VecDeque<QueryState>,
}

#[derive(Default)]
struct State {
    groups: HashMap<String, StoredFeatureGroup>,
    scripted_statuses: HashMap<String, VecDeque<FeatureGroupStatus>>,
    create_failures: HashMap<String, String>,
    query_outcomes: HashMap<String, QueryOutcome>,
    queued_states: VecDeque<QueryState>,
    queries: BTreeMap<String, StoredQuery>,
    next_query_id: u64,
}

#[derive(Default)]
pub struct InMemoryFeatureStore {
    state: Mutex<State>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("In-memory feature store lock poisoned"))
    }

    /// Statuses reported by successive describe calls for `name` once it exists. After the
    /// script runs out the group carries on from the last scripted status.
    pub fn script_statuses(
        &self,
        name: &str,
        statuses: impl IntoIterator<Item = FeatureGroupStatus>,
    ) -> Result<()> {
        self.lock()?
            .scripted_statuses
            .insert(name.to_string(), statuses.into_iter().collect());
        Ok(())
    }

    /// Makes the next create call for `name` fail with `message`.
    pub fn fail_next_create(&self, name: &str, message: impl Into<String>) -> Result<()> {
        self.lock()?
            .create_failures
            .insert(name.to_string(), message.into());
        Ok(())
    }

    /// States a submitted query passes through before it succeeds or fails.
    pub fn queue_query_states(&self, states: impl IntoIterator<Item = QueryState>) -> Result<()> {
        self.lock()?.queued_states.extend(states);
        Ok(())
    }

    pub fn register_query_result(&self, query: impl Into<String>, rows: Table) -> Result<()> {
        self.lock()?
            .query_outcomes
            .insert(query.into(), QueryOutcome::Rows(rows));
        Ok(())
    }

    pub fn register_query_failure(
        &self,
        query: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.lock()?
            .query_outcomes
            .insert(query.into(), QueryOutcome::Failure(reason.into()));
        Ok(())
    }

    pub fn create_request(&self, name: &str) -> Result<Option<CreateFeatureGroupRequest>> {
        Ok(self.lock()?.groups.get(name).map(|group| group.request.clone()))
    }

    /// Latest record per record identifier, ordered by identifier.
    pub fn online_records(&self, name: &str) -> Result<Vec<Record>> {
        Ok(self
            .lock()?
            .groups
            .get(name)
            .map(|group| group.online_records.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn put_count(&self, name: &str) -> Result<usize> {
        Ok(self
            .lock()?
            .groups
            .get(name)
            .map(|group| group.put_count)
            .unwrap_or_default())
    }

    pub fn submitted_queries(&self) -> Result<Vec<QueryRequest>> {
        Ok(self
            .lock()?
            .queries
            .values()
            .map(|query| query.request.clone())
            .collect())
    }
}

fn offline_table_name(name: &str) -> String {
    format!(
        "{}_{}",
        name.to_lowercase().replace('-', "_"),
        Utc::now().timestamp()
    )
}

#[async_trait]
impl FeatureGroupService for InMemoryFeatureStore {
    async fn create_feature_group(&self, request: &CreateFeatureGroupRequest) -> Result<()> {
        let mut state = self.lock()?;
        let name = &request.feature_group_name;
        if let Some(message) = state.create_failures.remove(name) {
            return Err(anyhow!(message));
        }
        if state.groups.contains_key(name) {
            return Err(FeatureStoreError::feature_group_already_exists(name).into());
        }
        debug!("Creating in-memory feature group {}", name);
        state.groups.insert(
            name.clone(),
            StoredFeatureGroup {
                request: request.clone(),
                status: FeatureGroupStatus::Creating,
                failure_reason: None,
                offline_table_name: offline_table_name(name),
                online_records: BTreeMap::new(),
                put_count: 0,
            },
        );
        Ok(())
    }

    async fn describe_feature_group(&self, name: &str) -> Result<FeatureGroupDescription> {
        let mut state = self.lock()?;
        let State {
            groups,
            scripted_statuses,
            ..
        } = &mut *state;
        let group = groups
            .get_mut(name)
            .ok_or_else(|| FeatureStoreError::feature_group_not_found(name))?;
        let next_status = scripted_statuses
            .get_mut(name)
            .and_then(|statuses| statuses.pop_front());
        let described_status = match next_status {
            Some(status) => {
                if status == FeatureGroupStatus::CreateFailed {
                    group.failure_reason = Some("Scripted creation failure".to_string());
                }
                group.status = status.clone();
                status
            }
            None => {
                let current = group.status.clone();
                if current == FeatureGroupStatus::Creating {
                    group.status = FeatureGroupStatus::Created;
                }
                current
            }
        };
        Ok(FeatureGroupDescription {
            name: name.to_string(),
            status: described_status,
            failure_reason: group.failure_reason.clone(),
            offline_store: Some(DataCatalog {
                catalog: DEFAULT_CATALOG.to_string(),
                database: DEFAULT_DATABASE.to_string(),
                table_name: group.offline_table_name.clone(),
            }),
        })
    }
}

#[async_trait]
impl FeatureStoreRuntime for InMemoryFeatureStore {
    async fn put_record(&self, feature_group_name: &str, record: &Record) -> Result<()> {
        let mut state = self.lock()?;
        let group = state
            .groups
            .get_mut(feature_group_name)
            .ok_or_else(|| FeatureStoreError::feature_group_not_found(feature_group_name))?;
        if group.status != FeatureGroupStatus::Created {
            return Err(anyhow!(
                "Feature group {} is {} and cannot accept records",
                feature_group_name,
                group.status
            ));
        }
        let identifier_name = &group.request.record_identifier_feature_name;
        let identifier = record
            .get(identifier_name)
            .ok_or_else(|| anyhow!("Record is missing identifier {}", identifier_name))?
            .to_string();
        group.online_records.insert(identifier, record.clone());
        group.put_count += 1;
        Ok(())
    }
}

#[async_trait]
impl QueryEngine for InMemoryFeatureStore {
    async fn start_query(&self, request: &QueryRequest) -> Result<String> {
        let mut state = self.lock()?;
        state.next_query_id += 1;
        let query_execution_id = format!("query-{:04}", state.next_query_id);
        let pending_states = std::mem::take(&mut state.queued_states);
        state.queries.insert(
            query_execution_id.clone(),
            StoredQuery {
                request: request.clone(),
                pending_states,
            },
        );
        Ok(query_execution_id)
    }

    async fn get_query_execution(&self, query_execution_id: &str) -> Result<QueryExecution> {
        let mut state = self.lock()?;
        let State {
            queries,
            query_outcomes,
            ..
        } = &mut *state;
        let query = queries
            .get_mut(query_execution_id)
            .ok_or_else(|| anyhow!("Unknown query execution {}", query_execution_id))?;
        let output_location = Some(format!(
            "{}{}.csv",
            query.request.output_location, query_execution_id
        ));
        if let Some(pending) = query.pending_states.pop_front() {
            return Ok(QueryExecution {
                query_execution_id: query_execution_id.to_string(),
                state: pending,
                state_change_reason: None,
                output_location,
            });
        }
        let (query_state, state_change_reason) =
            match query_outcomes.get(&query.request.query_string) {
                Some(QueryOutcome::Rows(_)) => (QueryState::Succeeded, None),
                Some(QueryOutcome::Failure(reason)) => (QueryState::Failed, Some(reason.clone())),
                None => (
                    QueryState::Failed,
                    Some(format!(
                        "No result registered for query: {}",
                        query.request.query_string
                    )),
                ),
            };
        Ok(QueryExecution {
            query_execution_id: query_execution_id.to_string(),
            state: query_state,
            state_change_reason,
            output_location,
        })
    }

    async fn fetch_results(&self, execution: &QueryExecution) -> Result<Table> {
        let state = self.lock()?;
        let query = state
            .queries
            .get(&execution.query_execution_id)
            .ok_or_else(|| anyhow!("Unknown query execution {}", execution.query_execution_id))?;
        match state.query_outcomes.get(&query.request.query_string) {
            Some(QueryOutcome::Rows(rows)) => Ok(rows.clone()),
            _ => Err(anyhow!(
                "Query {} has no results",
                execution.query_execution_id
            )),
        }
    }
}
