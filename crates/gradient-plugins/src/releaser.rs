//! The Releaser contract — traffic distribution in the service mesh.

use async_trait::async_trait;

use crate::error::{ConfigError, PluginError};

/// Which variant of a service a mesh-level operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceVariant {
    All,
    Primary,
    Candidate,
}

impl std::fmt::Display for ServiceVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceVariant::All => f.write_str("all"),
            ServiceVariant::Primary => f.write_str("primary"),
            ServiceVariant::Candidate => f.write_str("candidate"),
        }
    }
}

/// Governs traffic distribution between the primary and candidate
/// variants of a service in the mesh.
#[async_trait]
pub trait Releaser: Send + Sync {
    /// Parse the opaque config blob. Validation errors carry per-field
    /// messages.
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError>;

    /// Idempotently create the mesh resources the traffic split needs.
    ///
    /// The initial splitter sends 100% of traffic to the candidate and
    /// 0% to the primary, since no primary exists on first setup.
    async fn setup(&self) -> Result<(), PluginError>;

    /// Set candidate traffic to `traffic` percent and primary traffic to
    /// `100 - traffic`. Safe to call repeatedly with the same value.
    async fn scale(&self, traffic: i32) -> Result<(), PluginError>;

    /// Remove every mesh resource created by `setup`, in strict reverse
    /// order of creation.
    async fn destroy(&self) -> Result<(), PluginError>;

    /// Block until all mesh health checks for the given variant pass, or
    /// return an error on timeout.
    async fn wait_until_healthy(&self, variant: ServiceVariant) -> Result<(), PluginError>;
}
