use crate::model::{FeatureGroupStatus, FeatureType, QueryState};
use crate::table::DataType;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureStoreError {
    FeatureGroupAlreadyExists {
        name: String,
    },
    FeatureGroupNotFound {
        name: String,
    },
    FeatureGroupCreationFailed {
        name: String,
        status: FeatureGroupStatus,
        reason: Option<String>,
    },
    OfflineStoreUnavailable {
        name: String,
    },
    QueryFailed {
        query_execution_id: String,
        state: QueryState,
        reason: Option<String>,
    },
    IngestionFailed {
        name: String,
        failed_rows: Vec<usize>,
    },
    UnsupportedColumnType {
        column: String,
        data_type: DataType,
    },
    MissingFeature {
        feature_group: String,
        feature: String,
    },
    InvalidEventTimeType {
        feature: String,
        feature_type: FeatureType,
    },
    PollTimedOut {
        operation: String,
        attempts: u32,
    },
    Cancelled {
        operation: String,
    },
}

impl FeatureStoreError {
    pub fn feature_group_already_exists(name: impl Into<String>) -> Self {
        Self::FeatureGroupAlreadyExists { name: name.into() }
    }

    pub fn feature_group_not_found(name: impl Into<String>) -> Self {
        Self::FeatureGroupNotFound { name: name.into() }
    }

    pub fn creation_failed(
        name: impl Into<String>,
        status: FeatureGroupStatus,
        reason: Option<String>,
    ) -> Self {
        Self::FeatureGroupCreationFailed {
            name: name.into(),
            status,
            reason,
        }
    }

    pub fn offline_store_unavailable(name: impl Into<String>) -> Self {
        Self::OfflineStoreUnavailable { name: name.into() }
    }

    pub fn missing_feature(feature_group: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::MissingFeature {
            feature_group: feature_group.into(),
            feature: feature.into(),
        }
    }

    pub fn poll_timed_out(operation: impl Into<String>, attempts: u32) -> Self {
        Self::PollTimedOut {
            operation: operation.into(),
            attempts,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::FeatureGroupAlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FeatureGroupNotFound { .. })
    }

    /// Checks whether an `anyhow` error carries the given condition.
    pub fn matches(err: &anyhow::Error, predicate: impl Fn(&Self) -> bool) -> bool {
        err.downcast_ref::<Self>().is_some_and(predicate)
    }
}

impl Display for FeatureStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureGroupAlreadyExists { name } => {
                write!(f, "Feature group '{}' already exists", name)
            }
            Self::FeatureGroupNotFound { name } => {
                write!(f, "Feature group '{}' not found", name)
            }
            Self::FeatureGroupCreationFailed {
                name,
                status,
                reason: Some(reason),
            } => write!(
                f,
                "Failed to create feature group {} (status {}): {}",
                name, status, reason
            ),
            Self::FeatureGroupCreationFailed {
                name,
                status,
                reason: None,
            } => write!(
                f,
                "Failed to create feature group {} (status {})",
                name, status
            ),
            Self::OfflineStoreUnavailable { name } => write!(
                f,
                "Feature group '{}' has no offline store data catalog",
                name
            ),
            Self::QueryFailed {
                query_execution_id,
                state,
                reason: Some(reason),
            } => write!(
                f,
                "Query {} finished with state {}: {}",
                query_execution_id, state, reason
            ),
            Self::QueryFailed {
                query_execution_id,
                state,
                reason: None,
            } => write!(
                f,
                "Query {} finished with state {}",
                query_execution_id, state
            ),
            Self::IngestionFailed { name, failed_rows } => write!(
                f,
                "Failed to ingest {} row(s) into feature group {}: rows {:?}",
                failed_rows.len(),
                name,
                failed_rows
            ),
            Self::UnsupportedColumnType { column, data_type } => write!(
                f,
                "Failed to infer feature type for column '{}' with type {}",
                column, data_type
            ),
            Self::MissingFeature {
                feature_group,
                feature,
            } => write!(
                f,
                "Feature '{}' required by feature group {} is not a column of the data",
                feature, feature_group
            ),
            Self::InvalidEventTimeType {
                feature,
                feature_type,
            } => write!(
                f,
                "Event time feature '{}' must be String or Fractional, got {}",
                feature, feature_type
            ),
            Self::PollTimedOut {
                operation,
                attempts,
            } => write!(f, "Gave up waiting for {} after {} attempts", operation, attempts),
            Self::Cancelled { operation } => write!(f, "Waiting for {} was cancelled", operation),
        }
    }
}

impl std::error::Error for FeatureStoreError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn creation_failure_names_the_group() {
        let err = FeatureStoreError::creation_failed(
            "shuttles",
            FeatureGroupStatus::CreateFailed,
            Some("role is missing permissions".to_string()),
        );
        let message = err.to_string();
        assert!(message.contains("shuttles"));
        assert!(message.contains("CreateFailed"));
        assert!(message.contains("role is missing permissions"));
    }

    #[test]
    fn matches_through_anyhow() {
        let err: anyhow::Error = FeatureStoreError::feature_group_already_exists("shuttles").into();
        assert!(FeatureStoreError::matches(
            &err,
            FeatureStoreError::is_already_exists
        ));
        assert!(!FeatureStoreError::matches(
            &err,
            FeatureStoreError::is_not_found
        ));

        let other = anyhow!("Resource Already Exists: FeatureGroup with name shuttles already exists");
        assert!(!FeatureStoreError::matches(
            &other,
            FeatureStoreError::is_already_exists
        ));
    }
}
