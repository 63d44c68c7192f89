//! Built-in runtime for orchestrated workloads.
//!
//! `WorkloadRuntime` maintains the primary/candidate pair: the live
//! workload matched by the configured selector is the candidate, and
//! the controller owns a clone of it named `{candidate}-primary`. All
//! platform access goes through [`WorkloadClient`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, PluginError};
use crate::runtime::{
    DeploymentStatus, Runtime, RuntimeBaseConfig, RuntimeBaseState, VERSION_LABEL, WorkloadClient,
};
use crate::state::PluginStateStore;

/// The built-in `orchestrator` runtime plugin.
pub struct WorkloadRuntime {
    client: Arc<dyn WorkloadClient>,
    state_store: Arc<dyn PluginStateStore>,
    release_name: String,
    config: RuntimeBaseConfig,
    state: RuntimeBaseState,
}

impl WorkloadRuntime {
    pub fn new(
        client: Arc<dyn WorkloadClient>,
        state_store: Arc<dyn PluginStateStore>,
        release_name: &str,
    ) -> Self {
        Self {
            client,
            state_store,
            release_name: release_name.to_string(),
            config: RuntimeBaseConfig::default(),
            state: RuntimeBaseState::default(),
        }
    }

    fn save_state(&self) {
        match serde_json::to_vec(&self.state) {
            Ok(data) => self.state_store.save(&data),
            Err(error) => warn!(%error, release = %self.release_name, "unable to serialize runtime state"),
        }
    }
}

#[async_trait]
impl Runtime for WorkloadRuntime {
    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ConfigError> {
        let mut parsed: RuntimeBaseConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Decode(e.to_string()))?;

        if parsed.namespace.is_empty() {
            parsed.namespace = "default".to_string();
        }
        if parsed.deployment.is_empty() {
            return Err(ConfigError::Validation(vec![
                "deployment: required field is empty".to_string(),
            ]));
        }

        self.config = parsed;

        // Pick up candidate/primary names from a previous run of this
        // release, if any.
        if let Some(data) = self.state_store.load() {
            match serde_json::from_slice(&data) {
                Ok(state) => self.state = state,
                Err(error) => {
                    warn!(%error, release = %self.release_name, "discarding unreadable runtime state")
                }
            }
        }

        Ok(())
    }

    fn base_config(&self) -> RuntimeBaseConfig {
        self.config.clone()
    }

    async fn init_primary(&mut self) -> Result<DeploymentStatus, PluginError> {
        debug!(
            selector = %self.config.deployment,
            namespace = %self.config.namespace,
            "initializing primary workload"
        );

        let candidate = match self
            .client
            .get_workload_with_selector(&self.config.deployment, &self.config.namespace)
            .await
        {
            Ok(w) => w,
            Err(e) if e.is_not_found() => return Ok(DeploymentStatus::NotFound),
            Err(e) => return Err(e.into()),
        };

        // A client that does not filter its matches can hand back one of
        // the controller's own clones; never adopt those as candidates.
        if candidate.meta.contains_key(VERSION_LABEL) {
            return Ok(DeploymentStatus::NotFound);
        }

        self.state.candidate_name = candidate.name.clone();
        self.state.primary_name = format!("{}-primary", candidate.name);
        self.save_state();

        match self
            .client
            .get_workload(&self.state.primary_name, &self.config.namespace)
            .await
        {
            Ok(_) => return Ok(DeploymentStatus::NoAction),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let mut primary = candidate.clone();
        primary.name = self.state.primary_name.clone();
        primary
            .meta
            .insert(VERSION_LABEL.to_string(), "primary".to_string());

        info!(
            candidate = %candidate.name,
            primary = %primary.name,
            "cloning candidate into a new primary"
        );
        self.client.clone_workload(&candidate, &primary).await?;
        self.client
            .healthy_workload(&primary.name, &self.config.namespace)
            .await?;

        Ok(DeploymentStatus::Update)
    }

    async fn promote_candidate(&mut self) -> Result<DeploymentStatus, PluginError> {
        if self.state.candidate_name.is_empty() {
            return Ok(DeploymentStatus::NotFound);
        }

        let candidate = match self
            .client
            .healthy_workload(&self.state.candidate_name, &self.config.namespace)
            .await
        {
            Ok(w) => w,
            Err(e) if e.is_not_found() => return Ok(DeploymentStatus::NotFound),
            Err(e) => return Err(e.into()),
        };

        info!(
            candidate = %candidate.name,
            primary = %self.state.primary_name,
            "promoting candidate to primary"
        );

        match self
            .client
            .delete_workload(&self.state.primary_name, &self.config.namespace)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let mut primary = candidate.clone();
        primary.name = self.state.primary_name.clone();
        primary
            .meta
            .insert(VERSION_LABEL.to_string(), "primary".to_string());

        self.client.clone_workload(&candidate, &primary).await?;
        self.client
            .healthy_workload(&primary.name, &self.config.namespace)
            .await?;
        self.save_state();

        Ok(DeploymentStatus::Update)
    }

    async fn remove_candidate(&mut self) -> Result<(), PluginError> {
        let mut candidate = match self
            .client
            .get_workload(&self.state.candidate_name, &self.config.namespace)
            .await
        {
            Ok(w) => w,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        debug!(candidate = %candidate.name, "scaling candidate to zero");
        candidate.instances = 0;
        candidate
            .meta
            .insert(VERSION_LABEL.to_string(), "retired".to_string());
        self.client.update_workload(&candidate).await?;

        Ok(())
    }

    async fn restore_original(&mut self) -> Result<(), PluginError> {
        let primary = match self
            .client
            .get_workload(&self.state.primary_name, &self.config.namespace)
            .await
        {
            Ok(w) => w,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        info!(
            primary = %primary.name,
            candidate = %self.state.candidate_name,
            "restoring original workload from primary"
        );

        match self
            .client
            .delete_workload(&self.state.candidate_name, &self.config.namespace)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let mut original = primary.clone();
        original.name = self.state.candidate_name.clone();
        // The restored workload is no longer controller-owned.
        original.meta.remove(VERSION_LABEL);

        self.client.clone_workload(&primary, &original).await?;
        self.client
            .healthy_workload(&original.name, &self.config.namespace)
            .await?;

        Ok(())
    }

    async fn remove_primary(&mut self) -> Result<(), PluginError> {
        match self
            .client
            .delete_workload(&self.state.primary_name, &self.config.namespace)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
