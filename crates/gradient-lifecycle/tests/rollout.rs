//! End-to-end rollouts over the in-memory backends: real plugins, real
//! store, no mocks.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use gradient_lifecycle::{MachineHandle, PluginSet, StateMachine, Timing};
use gradient_metrics::MetricsCollector;
use gradient_model::{PluginConfig, Release, State};
use gradient_plugins::memory::{MemoryMesh, MemoryWorkloads, StaticMetrics};
use gradient_plugins::state::MemoryPluginState;
use gradient_plugins::{
    CanaryStrategy, MeshReleaser, MetricsMonitor, Monitor, Releaser, Runtime, Strategy,
    VERSION_LABEL, Workload, WorkloadRuntime,
};
use gradient_store::ReleaseStore;

struct Env {
    mesh: Arc<MemoryMesh>,
    workloads: Arc<MemoryWorkloads>,
    metrics: Arc<StaticMetrics>,
    store: ReleaseStore,
}

impl Env {
    async fn new() -> Self {
        let mesh = Arc::new(MemoryMesh::default());
        mesh.set_healthy(true).await;
        Self {
            mesh,
            workloads: Arc::new(MemoryWorkloads::default()),
            metrics: Arc::new(StaticMetrics::default()),
            store: ReleaseStore::open_in_memory().unwrap(),
        }
    }

    /// Configure the full built-in plugin set against the in-memory
    /// backends and start a machine for the release.
    fn start(&self, release: &Release) -> MachineHandle {
        let mut releaser: Box<dyn Releaser> = Box::new(
            MeshReleaser::new(self.mesh.clone())
                .with_health_timing(Duration::from_millis(100), Duration::from_millis(5)),
        );
        releaser.configure(&release.releaser.config).unwrap();

        let mut runtime: Box<dyn Runtime> = Box::new(WorkloadRuntime::new(
            self.workloads.clone(),
            Arc::new(MemoryPluginState::default()),
            &release.name,
        ));
        runtime.configure(&release.runtime.config).unwrap();
        let base = runtime.base_config();

        let mut monitor: Box<dyn Monitor> = Box::new(MetricsMonitor::new(self.metrics.clone()));
        monitor
            .configure(
                &base.deployment,
                &base.namespace,
                &release.runtime.plugin_name,
                &release.monitor.config,
            )
            .unwrap();

        let mut strategy: Box<dyn Strategy> = Box::new(CanaryStrategy::new(
            Arc::from(monitor),
            Arc::new(MemoryPluginState::default()),
        ));
        strategy
            .configure(&release.name, &release.namespace, &release.strategy.config)
            .unwrap();

        StateMachine::start(
            release.clone(),
            PluginSet {
                releaser,
                runtime,
                strategy,
            },
            self.store.clone(),
            MetricsCollector::new(),
            Timing::fast(),
        )
    }
}

fn release_record(monitor_config: serde_json::Value) -> Release {
    Release {
        name: "api".to_string(),
        namespace: "default".to_string(),
        version: "1".to_string(),
        releaser: PluginConfig {
            plugin_name: "mesh".to_string(),
            config: json!({"service": "api"}),
        },
        runtime: PluginConfig {
            plugin_name: "orchestrator".to_string(),
            config: json!({"deployment": "api"}),
        },
        monitor: PluginConfig {
            plugin_name: "metrics".to_string(),
            config: monitor_config,
        },
        strategy: PluginConfig {
            plugin_name: "canary".to_string(),
            config: json!({
                "interval": "1ms",
                "initial_traffic": 10,
                "traffic_step": 10,
                "max_traffic": 30,
                "error_threshold": 2
            }),
        },
        current_state: State::Start,
        state_history: vec![],
        created: 0,
        last_updated: 0,
    }
}

fn history(store: &ReleaseStore, name: &str) -> Vec<State> {
    store
        .get_release(name)
        .unwrap()
        .state_history
        .iter()
        .map(|e| e.state)
        .collect()
}

#[tokio::test]
async fn canary_rollout_ramps_and_promotes() {
    let env = Env::new().await;
    // The live workload and an already-cloned primary exist, as they
    // would after a previous completed rollout.
    env.workloads.put(Workload::new("api", "default")).await;
    env.workloads.put(Workload::new("api-primary", "default")).await;

    let release = release_record(json!({"address": "http://metrics:9090", "queries": []}));
    let handle = env.start(&release);

    handle.configure().await.unwrap().wait().await.unwrap();
    let settled = handle.deploy().await.unwrap();
    assert_eq!(settled.wait().await.unwrap(), State::Idle);

    // Traffic climbed 10 → 20 → 30(max) and the candidate was promoted.
    assert_eq!(
        history(&env.store, "api"),
        vec![
            State::Configure,
            State::Idle,
            State::Deploy,
            State::Monitor,
            State::Scale,
            State::Monitor,
            State::Scale,
            State::Monitor,
            State::Promote,
            State::Idle,
        ]
    );

    // All traffic back on the new primary.
    assert_eq!(env.mesh.splitter("api", "default").await, Some((100, 0)));

    // The promoted clone carries the ownership label; the candidate was
    // retired in place.
    let primary = env.workloads.get("api-primary", "default").await.unwrap();
    assert_eq!(primary.meta.get(VERSION_LABEL).map(String::as_str), Some("primary"));

    let candidate = env.workloads.get("api", "default").await.unwrap();
    assert_eq!(candidate.instances, 0);
    assert_eq!(candidate.meta.get(VERSION_LABEL).map(String::as_str), Some("retired"));
}

#[tokio::test]
async fn failing_checks_roll_the_candidate_back() {
    let env = Env::new().await;
    env.workloads.put(Workload::new("api", "default")).await;
    env.workloads.put(Workload::new("api-primary", "default")).await;
    // Every sample breaches the minimum bound.
    env.metrics.set_samples(vec![0.0]);

    let release = release_record(json!({
        "address": "http://metrics:9090",
        "queries": [{"name": "success-rate", "query": "custom", "min": 1}]
    }));
    let handle = env.start(&release);

    handle.configure().await.unwrap().wait().await.unwrap();
    let settled = handle.deploy().await.unwrap();
    assert_eq!(settled.wait().await.unwrap(), State::Idle);

    let past = history(&env.store, "api");
    assert!(past.contains(&State::Rollback));
    assert!(!past.contains(&State::Promote));

    // The candidate was drained and retired; the primary still serves.
    assert_eq!(env.mesh.splitter("api", "default").await, Some((100, 0)));
    let candidate = env.workloads.get("api", "default").await.unwrap();
    assert_eq!(candidate.instances, 0);
    assert!(env.workloads.get("api-primary", "default").await.is_some());
}
