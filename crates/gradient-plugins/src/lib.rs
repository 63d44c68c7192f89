//! gradient-plugins — capability contracts and built-in plugins.
//!
//! Four plugin contracts drive every release:
//!
//! - [`Releaser`] governs traffic distribution in the service mesh.
//! - [`Runtime`] governs the workload on the orchestration platform.
//! - [`Monitor`] executes health checks against an observability backend.
//! - [`Strategy`] decides how traffic ramps based on monitor results.
//!
//! Each contract is polymorphic over named implementations selected by
//! the provider. Built-in plugins talk to external systems only through
//! the client traits ([`MeshClient`], [`WorkloadClient`],
//! [`MetricsClient`]); the [`memory`] module provides an in-memory
//! reference backend for tests and single-process mode.

pub mod canary;
pub mod duration;
pub mod error;
pub mod memory;
pub mod mesh;
pub mod metrics_monitor;
pub mod mocks;
pub mod monitor;
pub mod orchestrator;
pub mod releaser;
pub mod runtime;
pub mod state;
pub mod strategy;

pub use canary::CanaryStrategy;
pub use error::{ConfigError, PluginError};
pub use mesh::{MeshClient, MeshReleaser};
pub use metrics_monitor::{MetricsClient, MetricsMonitor};
pub use monitor::{CheckError, Monitor};
pub use orchestrator::WorkloadRuntime;
pub use releaser::{Releaser, ServiceVariant};
pub use runtime::{
    DeploymentStatus, Runtime, RuntimeBaseConfig, RuntimeBaseState, VERSION_LABEL, Workload,
    WorkloadClient, WorkloadError,
};
pub use state::PluginStateStore;
pub use strategy::{Strategy, StrategyStatus};
