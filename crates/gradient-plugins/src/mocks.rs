//! Recording test doubles for the plugin contracts.
//!
//! Every mock appends to a shared [`CallLog`] so tests can assert
//! ordering across plugins (e.g. the primary is removed before the
//! mesh resources are destroyed). Return values are scripted through
//! small queues; failure injection is per method name.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ConfigError, PluginError};
use crate::monitor::{CheckError, Monitor};
use crate::releaser::{Releaser, ServiceVariant};
use crate::runtime::{DeploymentStatus, Runtime, RuntimeBaseConfig};
use crate::strategy::{Strategy, StrategyStatus};

/// Shared, ordered record of plugin calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Snapshot of the log contents.
pub fn calls(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Default)]
struct FailSet {
    methods: Mutex<HashSet<String>>,
}

impl FailSet {
    fn arm(&self, method: &str) {
        self.methods.lock().unwrap().insert(method.to_string());
    }

    fn check(&self, method: &str) -> Result<(), PluginError> {
        if self.methods.lock().unwrap().contains(method) {
            return Err(PluginError::Other(format!("{method} failed (injected)")));
        }
        Ok(())
    }
}

/// Releaser double.
pub struct MockReleaser {
    log: CallLog,
    fails: FailSet,
}

impl MockReleaser {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fails: FailSet::default(),
        }
    }

    pub fn fail_on(&self, method: &str) {
        self.fails.arm(method);
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Default for MockReleaser {
    fn default() -> Self {
        Self::new(new_call_log())
    }
}

#[async_trait]
impl Releaser for MockReleaser {
    fn configure(&mut self, _config: &serde_json::Value) -> Result<(), ConfigError> {
        self.record("releaser.configure".to_string());
        Ok(())
    }

    async fn setup(&self) -> Result<(), PluginError> {
        self.record("releaser.setup".to_string());
        self.fails.check("setup")
    }

    async fn scale(&self, traffic: i32) -> Result<(), PluginError> {
        self.record(format!("releaser.scale({traffic})"));
        self.fails.check("scale")
    }

    async fn destroy(&self) -> Result<(), PluginError> {
        self.record("releaser.destroy".to_string());
        self.fails.check("destroy")
    }

    async fn wait_until_healthy(&self, variant: ServiceVariant) -> Result<(), PluginError> {
        self.record(format!("releaser.wait_until_healthy({variant})"));
        self.fails.check("wait_until_healthy")
    }
}

/// Runtime double. `init_primary` and `promote_candidate` pop scripted
/// statuses; when the queue is empty they return `NoAction` and
/// `Update` respectively.
pub struct MockRuntime {
    log: CallLog,
    fails: FailSet,
    base_config: Mutex<RuntimeBaseConfig>,
    init_statuses: Mutex<VecDeque<DeploymentStatus>>,
    promote_statuses: Mutex<VecDeque<DeploymentStatus>>,
}

impl MockRuntime {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fails: FailSet::default(),
            base_config: Mutex::new(RuntimeBaseConfig {
                deployment: "api-.*".to_string(),
                namespace: "default".to_string(),
            }),
            init_statuses: Mutex::new(VecDeque::new()),
            promote_statuses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_on(&self, method: &str) {
        self.fails.arm(method);
    }

    pub fn set_base_config(&self, deployment: &str, namespace: &str) {
        *self.base_config.lock().unwrap() = RuntimeBaseConfig {
            deployment: deployment.to_string(),
            namespace: namespace.to_string(),
        };
    }

    pub fn init_returns(&self, status: DeploymentStatus) {
        self.init_statuses.lock().unwrap().push_back(status);
    }

    pub fn promote_returns(&self, status: DeploymentStatus) {
        self.promote_statuses.lock().unwrap().push_back(status);
    }

    fn record(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(new_call_log())
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    fn configure(&mut self, _config: &serde_json::Value) -> Result<(), ConfigError> {
        self.record("runtime.configure");
        Ok(())
    }

    fn base_config(&self) -> RuntimeBaseConfig {
        self.base_config.lock().unwrap().clone()
    }

    async fn init_primary(&mut self) -> Result<DeploymentStatus, PluginError> {
        self.record("runtime.init_primary");
        self.fails.check("init_primary")?;
        Ok(self
            .init_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeploymentStatus::NoAction))
    }

    async fn promote_candidate(&mut self) -> Result<DeploymentStatus, PluginError> {
        self.record("runtime.promote_candidate");
        self.fails.check("promote_candidate")?;
        Ok(self
            .promote_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(DeploymentStatus::Update))
    }

    async fn remove_candidate(&mut self) -> Result<(), PluginError> {
        self.record("runtime.remove_candidate");
        self.fails.check("remove_candidate")
    }

    async fn restore_original(&mut self) -> Result<(), PluginError> {
        self.record("runtime.restore_original");
        self.fails.check("restore_original")
    }

    async fn remove_primary(&mut self) -> Result<(), PluginError> {
        self.record("runtime.remove_primary");
        self.fails.check("remove_primary")
    }
}

/// Monitor double. Checks pass unless a failure has been queued.
#[derive(Default)]
pub struct MockMonitor {
    results: Mutex<VecDeque<CheckError>>,
    checks: AtomicU64,
}

impl MockMonitor {
    pub fn fail_next(&self, error: CheckError) {
        self.results.lock().unwrap().push_back(error);
    }

    pub fn check_count(&self) -> u64 {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Monitor for MockMonitor {
    fn configure(
        &mut self,
        _workload: &str,
        _namespace: &str,
        _runtime_name: &str,
        _config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn check(&self, _interval: Duration) -> Result<(), CheckError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.results.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Strategy double executing a scripted sequence of steps; once the
/// script runs out it reports completion.
pub struct MockStrategy {
    log: CallLog,
    steps: Mutex<VecDeque<Result<(StrategyStatus, i32), String>>>,
}

impl MockStrategy {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            steps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_step(&self, status: StrategyStatus, traffic: i32) {
        self.steps.lock().unwrap().push_back(Ok((status, traffic)));
    }

    pub fn push_error(&self, message: &str) {
        self.steps.lock().unwrap().push_back(Err(message.to_string()));
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl Default for MockStrategy {
    fn default() -> Self {
        Self::new(new_call_log())
    }
}

#[async_trait]
impl Strategy for MockStrategy {
    fn configure(
        &mut self,
        _name: &str,
        _namespace: &str,
        _config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn execute(&mut self) -> Result<(StrategyStatus, i32), PluginError> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok((StrategyStatus::Complete, 100)));
        match step {
            Ok((status, traffic)) => {
                self.record(format!("strategy.execute -> {status:?}({traffic})"));
                Ok((status, traffic))
            }
            Err(message) => {
                self.record("strategy.execute -> error".to_string());
                Err(PluginError::Other(message))
            }
        }
    }
}
