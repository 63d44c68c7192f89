//! The Runtime contract — workload lifecycle on the orchestration platform.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ConfigError, PluginError};

/// Label set on workloads the controller owns or has modified. The
/// admission layer uses it to ignore the controller's own writes.
pub const VERSION_LABEL: &str = "gradient-release-version";

/// Outcome of a runtime deployment operation.
///
/// This three-way distinction (not a boolean) is load-bearing: the state
/// machine branches on it to decide whether a deploy is the first ever
/// (skip the strategy) or a genuine new rollout. Internal faults are
/// reported through the `Err` channel of the enclosing `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStatus {
    /// A primary did not exist and was cloned from the live workload.
    Update,
    /// The primary already exists; nothing to do.
    NoAction,
    /// No original workload located. Non-fatal for callers that tolerate
    /// absence.
    NotFound,
}

/// Base configuration every runtime plugin carries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeBaseConfig {
    /// Selector for workloads that trigger a release; may be a regular
    /// expression.
    pub deployment: String,
    /// Namespace of the workloads that trigger a release.
    #[serde(default)]
    pub namespace: String,
}

/// Base state every runtime plugin persists between operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeBaseState {
    /// Full name of the active candidate workload.
    #[serde(default)]
    pub candidate_name: String,
    /// Full name of the controller-owned primary clone.
    #[serde(default)]
    pub primary_name: String,
}

/// Governs the deployable workload: cloning a primary, promoting the
/// candidate, and cleanup. All cleanup operations are independently
/// idempotent; calling them on an already-removed resource is not an
/// error.
#[async_trait]
pub trait Runtime: Send + Sync {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError>;

    /// Selectors used by the admission layer to match incoming events.
    fn base_config(&self) -> RuntimeBaseConfig;

    /// Clone the live workload into a controller-owned primary if one
    /// does not exist yet.
    async fn init_primary(&mut self) -> Result<DeploymentStatus, PluginError>;

    /// Make the candidate the new primary.
    async fn promote_candidate(&mut self) -> Result<DeploymentStatus, PluginError>;

    /// Scale the candidate down to zero.
    async fn remove_candidate(&mut self) -> Result<(), PluginError>;

    /// Re-instate the original workload from the primary clone.
    async fn restore_original(&mut self) -> Result<(), PluginError>;

    /// Remove the controller-owned primary clone.
    async fn remove_primary(&mut self) -> Result<(), PluginError>;
}

/// Errors from the workload client. `NotFound` is a sentinel the
/// plugins match on; everything else is an internal fault.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("workload not found: {0}")]
    NotFound(String),

    #[error("workload not healthy: {0}")]
    NotHealthy(String),

    #[error("workload client error: {0}")]
    Client(String),
}

impl WorkloadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkloadError::NotFound(_))
    }
}

/// An abstract workload on the orchestration platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    pub name: String,
    pub namespace: String,
    /// Platform resource version, used for ownership bookkeeping.
    pub resource_version: String,
    /// Labels/meta attached to the workload.
    pub meta: HashMap<String, String>,
    /// Number of instances to run.
    pub instances: u32,
}

impl Workload {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            resource_version: String::new(),
            meta: HashMap::new(),
            instances: 1,
        }
    }
}

/// High-level functional interface for the orchestrator's API, the seam
/// platform adapters implement.
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Fetch a workload by exact name. `WorkloadError::NotFound` when
    /// absent; any other error is internal.
    async fn get_workload(&self, name: &str, namespace: &str) -> Result<Workload, WorkloadError>;

    /// Fetch the first workload whose name matches the given regular
    /// expression within the namespace. Workloads carrying
    /// [`VERSION_LABEL`] are skipped: the controller's own clones match
    /// the same selectors as the workloads they were cloned from.
    async fn get_workload_with_selector(
        &self,
        selector: &str,
        namespace: &str,
    ) -> Result<Workload, WorkloadError>;

    /// Update scale or metadata of an existing workload.
    async fn update_workload(&self, workload: &Workload) -> Result<(), WorkloadError>;

    /// Create a copy of `existing` under the identity described by `new`,
    /// replacing any workload already at that identity.
    async fn clone_workload(
        &self,
        existing: &Workload,
        new: &Workload,
    ) -> Result<(), WorkloadError>;

    /// Delete a workload by name.
    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<(), WorkloadError>;

    /// Block until the named workload reports healthy, then return it.
    async fn healthy_workload(&self, name: &str, namespace: &str)
    -> Result<Workload, WorkloadError>;
}
