//! Error types shared across the plugin contracts.

use thiserror::Error;

use crate::monitor::CheckError;
use crate::runtime::WorkloadError;

/// Configuration errors, surfaced synchronously at `configure` time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to decode plugin config: {0}")]
    Decode(String),

    /// One message per invalid field.
    #[error("invalid plugin config: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Errors from plugin operations (mesh, orchestrator, metrics calls).
///
/// These always route the state machine to `Fail`; they are never
/// retried within a single state action except the strategy's bounded
/// consecutive-failure loop.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("mesh operation failed: {0}")]
    Mesh(String),

    #[error(transparent)]
    Workload(#[from] WorkloadError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}
