use crate::poll::{Backoff, PollPolicy};
use crate::util::parse_s3_url;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INGEST_ROW_LIMIT: usize = 10;
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_CREATION_MAX_ATTEMPTS: u32 = 360;
const DEFAULT_QUERY_MAX_ATTEMPTS: u32 = 720;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    Fixed,
    Exponential {
        factor: u32,
        max_interval_seconds: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_seconds: u64,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl PollConfig {
    fn creation_default() -> Self {
        Self {
            interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            max_attempts: Some(DEFAULT_CREATION_MAX_ATTEMPTS),
            backoff: BackoffConfig::Fixed,
        }
    }

    fn query_default() -> Self {
        Self {
            interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            max_attempts: Some(DEFAULT_QUERY_MAX_ATTEMPTS),
            backoff: BackoffConfig::Fixed,
        }
    }

    /// A zero interval or backoff factor would poll the service without pausing.
    fn validate(&self, name: &str) -> Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow!("{}.interval_seconds must be greater than 0", name));
        }
        if let BackoffConfig::Exponential {
            factor,
            max_interval_seconds,
        } = self.backoff
        {
            if factor == 0 {
                return Err(anyhow!("{}.backoff.factor must be greater than 0", name));
            }
            if max_interval_seconds == 0 {
                return Err(anyhow!(
                    "{}.backoff.max_interval_seconds must be greater than 0",
                    name
                ));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> PollPolicy {
        let backoff = match self.backoff {
            BackoffConfig::Fixed => Backoff::Fixed,
            BackoffConfig::Exponential {
                factor,
                max_interval_seconds,
            } => Backoff::Exponential {
                factor,
                max_interval: Duration::from_secs(max_interval_seconds),
            },
        };
        PollPolicy {
            interval: Duration::from_secs(self.interval_seconds),
            max_attempts: self.max_attempts,
            backoff,
        }
    }
}

fn default_ingest_row_limit() -> usize {
    DEFAULT_INGEST_ROW_LIMIT
}

/// Everything the dataset needs to know about its feature group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroupConfig {
    pub name: String,
    /// Offline store location. Query results are staged under `<s3_uri>/query_results/`.
    pub s3_uri: String,
    pub record_identifier_name: String,
    pub event_time_name: String,
    /// Query run by `load`; `{table_name}` is replaced with the offline table name.
    pub query: String,
    #[serde(default)]
    pub description: Option<String>,
    pub role_arn: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_ingest_row_limit")]
    pub ingest_row_limit: usize,
    #[serde(default = "PollConfig::creation_default")]
    pub creation_poll: PollConfig,
    #[serde(default = "PollConfig::query_default")]
    pub query_poll: PollConfig,
}

impl FeatureGroupConfig {
    pub fn new(
        name: impl Into<String>,
        s3_uri: impl Into<String>,
        record_identifier_name: impl Into<String>,
        event_time_name: impl Into<String>,
        query: impl Into<String>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            s3_uri: s3_uri.into(),
            record_identifier_name: record_identifier_name.into(),
            event_time_name: event_time_name.into(),
            query: query.into(),
            description: None,
            role_arn: role_arn.into(),
            region: None,
            ingest_row_limit: DEFAULT_INGEST_ROW_LIMIT,
            creation_poll: PollConfig::creation_default(),
            query_poll: PollConfig::query_default(),
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(anyhow!("Empty configuration file"));
        }
        let config: FeatureGroupConfig =
            serde_saphyr::from_str(yaml).map_err(|err| anyhow!(err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("Feature group name must not be empty"));
        }
        parse_s3_url(&self.s3_uri)
            .map_err(|err| anyhow!("Invalid s3_uri '{}': {}", self.s3_uri, err))?;
        if !self.role_arn.starts_with("arn:") {
            return Err(anyhow!(
                "role_arn must be an IAM role ARN, got '{}'",
                self.role_arn
            ));
        }
        if self.record_identifier_name.is_empty() || self.event_time_name.is_empty() {
            return Err(anyhow!(
                "record_identifier_name and event_time_name must both be set"
            ));
        }
        self.creation_poll.validate("creation_poll")?;
        self.query_poll.validate("query_poll")?;
        Ok(())
    }

    /// Where `load` asks the query engine to stage its results.
    pub fn query_output_location(&self) -> String {
        format!("{}/query_results/", self.s3_uri.trim_end_matches('/'))
    }
}
