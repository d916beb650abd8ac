pub mod config;
pub mod dataset;
pub mod error;
pub mod feature_group;
pub mod model;
pub mod poll;
pub mod store;
pub mod table;
pub mod util;

pub use config::FeatureGroupConfig;
pub use dataset::{Dataset, DatasetDescription, FeatureGroupDataset};
pub use error::FeatureStoreError;
pub use feature_group::{FeatureGroup, OfflineQuery};
pub use store::{InMemoryFeatureStore, Session};
pub use table::{Column, DataType, Table, Value};
