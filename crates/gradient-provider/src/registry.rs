//! The plugin registry — a closed set of built-in implementations.
//!
//! Plugins are selected by name from the release definition. The set is
//! fixed at compile time: `mesh` (releaser), `orchestrator` (runtime),
//! `metrics` (monitor), and `canary` (strategy).

use std::sync::Arc;

use gradient_lifecycle::PluginSet;
use gradient_model::Release;
use gradient_plugins::{
    CanaryStrategy, MeshClient, MeshReleaser, MetricsClient, MetricsMonitor, Monitor, Releaser,
    Runtime, Strategy, WorkloadClient, WorkloadRuntime,
};
use gradient_store::ReleaseStore;

use crate::error::ProviderError;
use crate::state::StorePluginState;

/// Client seams the built-in plugins talk through. Production wires
/// platform adapters; tests and single-process mode use the in-memory
/// backends from `gradient_plugins::memory`.
#[derive(Clone)]
pub struct Clients {
    pub mesh: Arc<dyn MeshClient>,
    pub workloads: Arc<dyn WorkloadClient>,
    pub metrics: Arc<dyn MetricsClient>,
}

/// Build and configure the full plugin set for a release.
///
/// Construction order matters: the monitor needs the runtime's base
/// config for query interpolation, and the strategy owns the monitor.
pub fn build_plugins(
    clients: &Clients,
    store: &ReleaseStore,
    release: &Release,
) -> Result<PluginSet, ProviderError> {
    let mut releaser: Box<dyn Releaser> = match release.releaser.plugin_name.as_str() {
        "mesh" => Box::new(MeshReleaser::new(clients.mesh.clone())),
        name => {
            return Err(ProviderError::UnknownPlugin {
                kind: "releaser",
                name: name.to_string(),
            });
        }
    };
    releaser
        .configure(&release.releaser.config)
        .map_err(|source| ProviderError::Config {
            kind: "releaser",
            source,
        })?;

    let mut runtime: Box<dyn Runtime> = match release.runtime.plugin_name.as_str() {
        "orchestrator" => Box::new(WorkloadRuntime::new(
            clients.workloads.clone(),
            Arc::new(StorePluginState::new(store.clone(), &release.name, "runtime")),
            &release.name,
        )),
        name => {
            return Err(ProviderError::UnknownPlugin {
                kind: "runtime",
                name: name.to_string(),
            });
        }
    };
    runtime
        .configure(&release.runtime.config)
        .map_err(|source| ProviderError::Config {
            kind: "runtime",
            source,
        })?;
    let base = runtime.base_config();

    let mut monitor: Box<dyn Monitor> = match release.monitor.plugin_name.as_str() {
        "metrics" => Box::new(MetricsMonitor::new(clients.metrics.clone())),
        name => {
            return Err(ProviderError::UnknownPlugin {
                kind: "monitor",
                name: name.to_string(),
            });
        }
    };
    monitor
        .configure(
            &base.deployment,
            &base.namespace,
            &release.runtime.plugin_name,
            &release.monitor.config,
        )
        .map_err(|source| ProviderError::Config {
            kind: "monitor",
            source,
        })?;
    let monitor: Arc<dyn Monitor> = Arc::from(monitor);

    let mut strategy: Box<dyn Strategy> = match release.strategy.plugin_name.as_str() {
        "canary" => Box::new(CanaryStrategy::new(
            monitor,
            Arc::new(StorePluginState::new(store.clone(), &release.name, "strategy")),
        )),
        name => {
            return Err(ProviderError::UnknownPlugin {
                kind: "strategy",
                name: name.to_string(),
            });
        }
    };
    strategy
        .configure(&release.name, &release.namespace, &release.strategy.config)
        .map_err(|source| ProviderError::Config {
            kind: "strategy",
            source,
        })?;

    Ok(PluginSet {
        releaser,
        runtime,
        strategy,
    })
}
