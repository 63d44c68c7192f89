//! The admission check.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use gradient_model::{Release, State};
use gradient_plugins::{RuntimeBaseConfig, RuntimeBaseState, VERSION_LABEL};
use gradient_provider::{Provider, ProviderError};
use gradient_store::ListOptions;

/// A workload deployment observed on the platform.
#[derive(Debug, Clone)]
pub struct WorkloadEvent {
    pub name: String,
    pub namespace: String,
    /// Runtime plugin kind the event originates from, e.g.
    /// `"orchestrator"`. Only releases using that runtime are matched.
    pub runtime: String,
    pub labels: HashMap<String, String>,
}

/// Outcome of an admission check. Every variant except `Rejected`
/// allows the deployment to proceed on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The workload was written by the controller itself.
    ControllerUpdate,
    /// No release matches this workload.
    NoRelease,
    /// The matching release is tearing down; the event is ignored.
    DestroyInProgress { release: String },
    /// A rollout was started for the matching release.
    Deployed { release: String },
    /// The matching release has a rollout in flight.
    Rejected { release: String, state: State },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Rejected { .. })
    }

    /// Stable label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Decision::ControllerUpdate => "controller_update",
            Decision::NoRelease => "no_release",
            Decision::DestroyInProgress { .. } => "destroy_in_progress",
            Decision::Deployed { .. } => "deployed",
            Decision::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Matches workload events against registered releases and starts
/// rollouts.
pub struct AdmissionCheck {
    provider: Arc<Provider>,
}

impl AdmissionCheck {
    pub fn new(provider: Arc<Provider>) -> Self {
        Self { provider }
    }

    /// Decide what a workload deployment means for the registered
    /// releases. At most one release matches; the first match wins.
    pub async fn check(&self, event: &WorkloadEvent) -> Result<Decision, AdmissionError> {
        info!(
            workload = %event.name,
            namespace = %event.namespace,
            runtime = %event.runtime,
            "handling deployment admission"
        );

        let decision = self.evaluate(event).await?;
        self.provider.metrics().record_admission(decision.as_label());
        Ok(decision)
    }

    async fn evaluate(&self, event: &WorkloadEvent) -> Result<Decision, AdmissionError> {
        // The runtime plugin labels every workload it writes; those
        // events are echoes of our own changes, not new rollouts.
        if event
            .labels
            .get(VERSION_LABEL)
            .is_some_and(|v| !v.is_empty())
        {
            debug!(workload = %event.name, "ignoring deployment written by the controller");
            return Ok(Decision::ControllerUpdate);
        }

        let releases = self.provider.list_releases(&ListOptions {
            runtime: Some(event.runtime.clone()),
        })?;

        for release in releases {
            if !self.matches(&release, event) {
                continue;
            }

            let handle = self
                .provider
                .machine(&release.name)
                .ok_or_else(|| ProviderError::NoMachine(release.name.clone()))?;
            let state = handle.current_state();

            debug!(
                workload = %event.name,
                release = %release.name,
                %state,
                "found release for deployment"
            );

            if state == State::Destroy {
                return Ok(Decision::DestroyInProgress {
                    release: release.name,
                });
            }

            if matches!(state, State::Idle | State::Fail) {
                self.record_candidate(&release, &event.name);

                // Fresh plugins for the new rollout, then kick it off.
                let handle = self.provider.restart_machine(&release)?;
                handle.deploy().await.map_err(ProviderError::from)?;

                info!(
                    workload = %event.name,
                    release = %release.name,
                    "started rollout for new deployment"
                );
                return Ok(Decision::Deployed {
                    release: release.name,
                });
            }

            warn!(
                workload = %event.name,
                release = %release.name,
                %state,
                "rejecting deployment, release has an active rollout"
            );
            return Ok(Decision::Rejected {
                release: release.name,
                state,
            });
        }

        Ok(Decision::NoRelease)
    }

    /// Whether a release's runtime selector matches the workload. The
    /// selector is a regular expression, anchored at the end so `api`
    /// never matches `api-primary`.
    fn matches(&self, release: &Release, event: &WorkloadEvent) -> bool {
        let config: RuntimeBaseConfig =
            match serde_json::from_value(release.runtime.config.clone()) {
                Ok(config) => config,
                Err(error) => {
                    warn!(release = %release.name, %error, "unreadable runtime config, skipping");
                    return false;
                }
            };

        let mut selector = config.deployment;
        if !selector.ends_with('$') {
            selector.push('$');
        }
        let re = match Regex::new(&selector) {
            Ok(re) => re,
            Err(error) => {
                warn!(release = %release.name, %selector, %error, "invalid deployment selector, skipping");
                return false;
            }
        };

        let namespace = if config.namespace.is_empty() {
            "default"
        } else {
            &config.namespace
        };

        re.is_match(&event.name) && namespace == event.namespace
    }

    /// Record the workload as the release's candidate so the runtime
    /// plugin knows which deployment to clone.
    fn record_candidate(&self, release: &Release, candidate: &str) {
        let store = self.provider.store();

        let mut state: RuntimeBaseState = store
            .get_plugin_state(&release.name, "runtime")
            .ok()
            .flatten()
            .and_then(|data| serde_json::from_slice(&data).ok())
            .unwrap_or_default();
        state.candidate_name = candidate.to_string();

        match serde_json::to_vec(&state) {
            Ok(data) => {
                if let Err(error) = store.upsert_plugin_state(&release.name, "runtime", &data) {
                    warn!(release = %release.name, %error, "unable to save candidate name");
                }
            }
            Err(error) => {
                warn!(release = %release.name, %error, "unable to serialize runtime state")
            }
        }
    }
}
