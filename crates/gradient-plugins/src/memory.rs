//! In-memory reference backends for the client seams.
//!
//! These back the built-in plugins in tests and in single-process mode,
//! where no real mesh, orchestrator, or metrics backend exists. They
//! model just enough behavior for the plugins to exercise their full
//! flows: resource existence, traffic weights, workload health, and
//! canned metric samples.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use crate::error::PluginError;
use crate::mesh::MeshClient;
use crate::metrics_monitor::MetricsClient;
use crate::releaser::ServiceVariant;
use crate::runtime::{VERSION_LABEL, Workload, WorkloadClient, WorkloadError};

fn key(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}")
}

#[derive(Default)]
struct MeshState {
    defaults: HashSet<String>,
    resolvers: HashSet<String>,
    routers: HashSet<String>,
    splitters: HashMap<String, (i32, i32)>,
    healthy: bool,
    ops: Vec<String>,
}

/// In-memory mesh control plane.
#[derive(Default)]
pub struct MemoryMesh {
    state: RwLock<MeshState>,
}

impl MemoryMesh {
    pub async fn set_healthy(&self, healthy: bool) {
        self.state.write().await.healthy = healthy;
    }

    pub async fn has_defaults(&self, service: &str, namespace: &str) -> bool {
        self.state.read().await.defaults.contains(&key(service, namespace))
    }

    pub async fn has_resolver(&self, service: &str, namespace: &str) -> bool {
        self.state.read().await.resolvers.contains(&key(service, namespace))
    }

    pub async fn has_router(&self, service: &str, namespace: &str) -> bool {
        self.state.read().await.routers.contains(&key(service, namespace))
    }

    /// Current `(primary, candidate)` weights, if a splitter exists.
    pub async fn splitter(&self, service: &str, namespace: &str) -> Option<(i32, i32)> {
        self.state.read().await.splitters.get(&key(service, namespace)).copied()
    }

    /// Recorded operations whose name contains `needle`, in call order.
    pub async fn ops_matching(&self, needle: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .ops
            .iter()
            .filter(|op| op.contains(needle))
            .cloned()
            .collect()
    }

    async fn record(&self, op: &str, service: &str, namespace: &str) {
        self.state
            .write()
            .await
            .ops
            .push(format!("{op} {}", key(service, namespace)));
    }
}

#[async_trait]
impl MeshClient for MemoryMesh {
    async fn upsert_defaults(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("upsert_defaults", service, namespace).await;
        self.state.write().await.defaults.insert(key(service, namespace));
        Ok(())
    }

    async fn upsert_resolver(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("upsert_resolver", service, namespace).await;
        self.state.write().await.resolvers.insert(key(service, namespace));
        Ok(())
    }

    async fn upsert_router(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("upsert_router", service, namespace).await;
        self.state.write().await.routers.insert(key(service, namespace));
        Ok(())
    }

    async fn upsert_splitter(
        &self,
        service: &str,
        namespace: &str,
        primary: i32,
        candidate: i32,
    ) -> Result<(), PluginError> {
        self.record("upsert_splitter", service, namespace).await;
        self.state
            .write()
            .await
            .splitters
            .insert(key(service, namespace), (primary, candidate));
        Ok(())
    }

    async fn delete_splitter(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("delete_splitter", service, namespace).await;
        self.state.write().await.splitters.remove(&key(service, namespace));
        Ok(())
    }

    async fn delete_router(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("delete_router", service, namespace).await;
        self.state.write().await.routers.remove(&key(service, namespace));
        Ok(())
    }

    async fn delete_resolver(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("delete_resolver", service, namespace).await;
        self.state.write().await.resolvers.remove(&key(service, namespace));
        Ok(())
    }

    async fn delete_defaults(&self, service: &str, namespace: &str) -> Result<(), PluginError> {
        self.record("delete_defaults", service, namespace).await;
        self.state.write().await.defaults.remove(&key(service, namespace));
        Ok(())
    }

    async fn service_health(
        &self,
        _service: &str,
        _namespace: &str,
        _variant: ServiceVariant,
    ) -> Result<bool, PluginError> {
        Ok(self.state.read().await.healthy)
    }
}

/// In-memory workload store standing in for the orchestrator API.
#[derive(Default)]
pub struct MemoryWorkloads {
    workloads: RwLock<HashMap<String, Workload>>,
    unhealthy: RwLock<HashSet<String>>,
}

impl MemoryWorkloads {
    pub async fn put(&self, workload: Workload) {
        let k = key(&workload.name, &workload.namespace);
        self.workloads.write().await.insert(k, workload);
    }

    pub async fn get(&self, name: &str, namespace: &str) -> Option<Workload> {
        self.workloads.read().await.get(&key(name, namespace)).cloned()
    }

    pub async fn remove(&self, name: &str, namespace: &str) {
        self.workloads.write().await.remove(&key(name, namespace));
    }

    /// Mark a workload as failing its health checks.
    pub async fn set_unhealthy(&self, name: &str, namespace: &str, unhealthy: bool) {
        let mut set = self.unhealthy.write().await;
        if unhealthy {
            set.insert(key(name, namespace));
        } else {
            set.remove(&key(name, namespace));
        }
    }
}

#[async_trait]
impl WorkloadClient for MemoryWorkloads {
    async fn get_workload(&self, name: &str, namespace: &str) -> Result<Workload, WorkloadError> {
        self.workloads
            .read()
            .await
            .get(&key(name, namespace))
            .cloned()
            .ok_or_else(|| WorkloadError::NotFound(key(name, namespace)))
    }

    async fn get_workload_with_selector(
        &self,
        selector: &str,
        namespace: &str,
    ) -> Result<Workload, WorkloadError> {
        let re = Regex::new(&format!("{selector}$"))
            .map_err(|e| WorkloadError::Client(format!("invalid selector: {e}")))?;

        let workloads = self.workloads.read().await;
        let mut names: Vec<&String> = workloads.keys().collect();
        names.sort();

        for k in names {
            let w = &workloads[k];
            // Controller-owned clones also match the selector; they are
            // never candidates.
            if w.meta.contains_key(VERSION_LABEL) {
                continue;
            }
            if w.namespace == namespace && re.is_match(&w.name) {
                return Ok(w.clone());
            }
        }
        Err(WorkloadError::NotFound(format!("{selector}.{namespace}")))
    }

    async fn update_workload(&self, workload: &Workload) -> Result<(), WorkloadError> {
        let k = key(&workload.name, &workload.namespace);
        let mut workloads = self.workloads.write().await;
        if !workloads.contains_key(&k) {
            return Err(WorkloadError::NotFound(k));
        }
        workloads.insert(k, workload.clone());
        Ok(())
    }

    async fn clone_workload(
        &self,
        existing: &Workload,
        new: &Workload,
    ) -> Result<(), WorkloadError> {
        let mut copy = existing.clone();
        copy.name = new.name.clone();
        copy.namespace = new.namespace.clone();
        copy.meta = new.meta.clone();
        copy.instances = new.instances;
        self.workloads
            .write()
            .await
            .insert(key(&copy.name, &copy.namespace), copy);
        Ok(())
    }

    async fn delete_workload(&self, name: &str, namespace: &str) -> Result<(), WorkloadError> {
        self.workloads
            .write()
            .await
            .remove(&key(name, namespace))
            .map(|_| ())
            .ok_or_else(|| WorkloadError::NotFound(key(name, namespace)))
    }

    async fn healthy_workload(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Workload, WorkloadError> {
        if self.unhealthy.read().await.contains(&key(name, namespace)) {
            return Err(WorkloadError::NotHealthy(key(name, namespace)));
        }
        self.get_workload(name, namespace).await
    }
}

/// Metrics backend returning a fixed set of samples for every query.
#[derive(Default)]
pub struct StaticMetrics {
    samples: Mutex<Vec<f64>>,
    queries: Mutex<u64>,
}

impl StaticMetrics {
    pub fn set_samples(&self, samples: Vec<f64>) {
        *self.samples.lock().unwrap() = samples;
    }

    pub fn query_count(&self) -> u64 {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl MetricsClient for StaticMetrics {
    async fn query(&self, _address: &str, _query: &str) -> Result<Vec<f64>, String> {
        *self.queries.lock().unwrap() += 1;
        Ok(self.samples.lock().unwrap().clone())
    }
}
