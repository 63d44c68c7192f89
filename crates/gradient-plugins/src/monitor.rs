//! The Monitor contract — health checks against an observability backend.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ConfigError;

/// Why a monitor check did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The config references a preset query that does not exist. This is
    /// a configuration fault and is raised before any client call.
    #[error("preset query {0:?} does not exist")]
    UnknownPreset(String),

    /// Neither a preset nor a custom query was given.
    #[error("query {0:?} is empty, specify a preset or a query string")]
    EmptyQuery(String),

    /// The query executed but returned no data points.
    #[error("query {0:?} returned no data points")]
    NoData(String),

    /// A returned value fell outside the configured bounds.
    #[error("query {name:?} value {value} outside tolerance (min {min:?}, max {max:?})")]
    OutOfBounds {
        name: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// The metrics backend could not be queried.
    #[error("query {name:?} failed: {cause}")]
    Query { name: String, cause: String },
}

impl CheckError {
    /// True for faults in the monitor configuration itself, which should
    /// never be retried.
    pub fn is_config(&self) -> bool {
        matches!(self, CheckError::UnknownPreset(_) | CheckError::EmptyQuery(_))
    }
}

/// Executes preset health/metric checks for one release.
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Configure with the workload identity (used for query
    /// interpolation) and the opaque monitor config.
    fn configure(
        &mut self,
        workload: &str,
        namespace: &str,
        runtime_name: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError>;

    /// Run every configured query once. Returns the first failure,
    /// naming the query and threshold; `Ok(())` when all pass.
    async fn check(&self, interval: Duration) -> Result<(), CheckError>;
}
