//! The provider — owns the store, the clients, and one state machine
//! per active release.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use gradient_lifecycle::{MachineHandle, Settled, StateMachine, Timing};
use gradient_metrics::MetricsCollector;
use gradient_model::{epoch_secs, Release, State};
use gradient_store::{ListOptions, ReleaseStore};

use crate::error::ProviderError;
use crate::registry::{build_plugins, Clients};

pub struct Provider {
    store: ReleaseStore,
    clients: Clients,
    metrics: Arc<MetricsCollector>,
    timing: Timing,
    machines: Mutex<HashMap<String, MachineHandle>>,
}

impl Provider {
    pub fn new(
        store: ReleaseStore,
        clients: Clients,
        metrics: Arc<MetricsCollector>,
        timing: Timing,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            clients,
            metrics,
            timing,
            machines: Mutex::new(HashMap::new()),
        })
    }

    pub fn store(&self) -> &ReleaseStore {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Register (or replace) a release: validate and build its plugins,
    /// persist the record, start its machine, and fire `Configure`.
    ///
    /// Returns once the event is accepted; the returned [`Settled`]
    /// resolves when configuration finishes.
    pub async fn create_release(&self, mut release: Release) -> Result<Settled, ProviderError> {
        // Validate before persisting anything.
        let plugins = build_plugins(&self.clients, &self.store, &release)?;

        if release.created == 0 {
            release.created = epoch_secs();
        }
        self.store.upsert_release(&release)?;

        let name = release.name.clone();
        let handle = StateMachine::start(
            release,
            plugins,
            self.store.clone(),
            self.metrics.clone(),
            self.timing.clone(),
        );
        let settled = handle.configure().await?;

        // Replacing an existing machine drops its last handle; the old
        // driver task exits on its own.
        self.machines.lock().unwrap().insert(name.clone(), handle);
        self.update_active_gauge();

        info!(release = %name, "release registered");
        Ok(settled)
    }

    pub fn get_release(&self, name: &str) -> Result<Release, ProviderError> {
        Ok(self.store.get_release(name)?)
    }

    pub fn list_releases(&self, options: &ListOptions) -> Result<Vec<Release>, ProviderError> {
        Ok(self.store.list_releases(options)?)
    }

    /// Handle to the running machine for a release, if any.
    pub fn machine(&self, name: &str) -> Option<MachineHandle> {
        self.machines.lock().unwrap().get(name).cloned()
    }

    /// Build fresh plugins and replace the running machine for a
    /// release. Admission uses this to recycle a settled machine before
    /// starting a new rollout, so stale plugin instances never carry
    /// over between rollouts.
    pub fn restart_machine(&self, release: &Release) -> Result<MachineHandle, ProviderError> {
        let plugins = build_plugins(&self.clients, &self.store, release)?;
        let handle = StateMachine::start(
            release.clone(),
            plugins,
            self.store.clone(),
            self.metrics.clone(),
            self.timing.clone(),
        );
        self.machines
            .lock()
            .unwrap()
            .insert(release.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Tear a release down and remove it. Fires `Destroy`, waits for the
    /// machine to settle, and deletes the record only if teardown ended
    /// in `Idle`.
    pub async fn delete_release(&self, name: &str) -> Result<(), ProviderError> {
        let handle = self
            .machine(name)
            .ok_or_else(|| ProviderError::NoMachine(name.to_string()))?;

        let settled = handle.destroy().await?;
        match settled.wait().await? {
            State::Idle => {
                self.store.delete_release(name)?;
                self.machines.lock().unwrap().remove(name);
                self.update_active_gauge();

                info!(release = %name, "release deleted");
                Ok(())
            }
            state => Err(ProviderError::DestroyFailed {
                name: name.to_string(),
                state,
            }),
        }
    }

    /// Rebuild machines for every stored release after a restart and
    /// resume their interrupted state actions. Releases whose plugins no
    /// longer build are skipped with an error, not fatal: one bad record
    /// must not keep the rest of the controller down.
    pub async fn resume_all(&self) -> Result<usize, ProviderError> {
        let releases = self.store.list_releases(&ListOptions::default())?;
        let mut resumed = 0;

        for release in releases {
            let name = release.name.clone();
            let state = release.current_state;

            let plugins = match build_plugins(&self.clients, &self.store, &release) {
                Ok(plugins) => plugins,
                Err(error) => {
                    error!(release = %name, %error, "unable to rebuild release, skipping");
                    continue;
                }
            };

            let handle = StateMachine::start(
                release,
                plugins,
                self.store.clone(),
                self.metrics.clone(),
                self.timing.clone(),
            );
            if let Err(error) = handle.resume().await {
                warn!(release = %name, %error, "unable to resume release");
                continue;
            }

            info!(release = %name, %state, "release resumed");
            self.machines.lock().unwrap().insert(name, handle);
            resumed += 1;
        }

        self.update_active_gauge();
        Ok(resumed)
    }

    fn update_active_gauge(&self) {
        let count = self.machines.lock().unwrap().len() as u64;
        self.metrics.set_active_releases(count);
    }
}
