//! The state machine driver.
//!
//! One driver task owns each release: its record, its configured
//! plugins, and the store handle. External callers talk to it through a
//! [`MachineHandle`] backed by an mpsc channel; state actions run
//! inline on the driver task, so a release never executes two actions
//! concurrently. Follow-up events raised by actions are applied in the
//! same loop before the next command is read.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use gradient_metrics::MetricsCollector;
use gradient_model::{Release, State};
use gradient_plugins::{DeploymentStatus, Releaser, Runtime, ServiceVariant, Strategy};
use gradient_store::ReleaseStore;

use crate::event::Event;
use crate::transition::transition;

/// Pacing for state actions.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Settling delay after mesh writes. Traffic configuration converges
    /// asynchronously in the data plane; removing a workload before it
    /// has converged sends requests to instances that no longer exist.
    pub step_delay: Duration,
    /// Upper bound for one state action.
    pub state_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_secs(5),
            state_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl Timing {
    /// No settling delay and a short action bound, for tests.
    pub fn fast() -> Self {
        Self {
            step_delay: Duration::ZERO,
            state_timeout: Duration::from_secs(5),
        }
    }
}

/// The configured plugins a release runs with. The monitor is owned by
/// the strategy; the driver never calls it directly.
pub struct PluginSet {
    pub releaser: Box<dyn Releaser>,
    pub runtime: Box<dyn Runtime>,
    pub strategy: Box<dyn Strategy>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("event {event} is not valid in state {state}")]
    InvalidTransition { state: State, event: String },

    #[error("state machine has stopped")]
    Stopped,
}

/// Resolves when the machine next settles in `Idle` or `Fail`.
#[derive(Debug)]
pub struct Settled(oneshot::Receiver<State>);

impl Settled {
    pub async fn wait(self) -> Result<State, LifecycleError> {
        self.0.await.map_err(|_| LifecycleError::Stopped)
    }
}

enum Command {
    Apply {
        event: Event,
        reply: oneshot::Sender<Result<Settled, LifecycleError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<Settled, LifecycleError>>,
    },
}

/// Handle to a running state machine. Cloneable; the driver task exits
/// when every handle is dropped.
#[derive(Clone)]
pub struct MachineHandle {
    tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<State>,
}

impl MachineHandle {
    pub async fn configure(&self) -> Result<Settled, LifecycleError> {
        self.apply(Event::Configure).await
    }

    pub async fn deploy(&self) -> Result<Settled, LifecycleError> {
        self.apply(Event::Deploy).await
    }

    pub async fn destroy(&self) -> Result<Settled, LifecycleError> {
        self.apply(Event::Destroy).await
    }

    /// Re-enter the current state's action after a restart.
    pub async fn resume(&self) -> Result<Settled, LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Resume { reply })
            .await
            .map_err(|_| LifecycleError::Stopped)?;
        rx.await.map_err(|_| LifecycleError::Stopped)?
    }

    pub fn current_state(&self) -> State {
        *self.state_rx.borrow()
    }

    /// Watch channel of state changes, for callers that poll or wait.
    pub fn state_changes(&self) -> watch::Receiver<State> {
        self.state_rx.clone()
    }

    async fn apply(&self, event: Event) -> Result<Settled, LifecycleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Apply { event, reply })
            .await
            .map_err(|_| LifecycleError::Stopped)?;
        rx.await.map_err(|_| LifecycleError::Stopped)?
    }
}

/// The driver: owns the release record and plugins, applies events, and
/// runs state actions.
pub struct StateMachine {
    release: Release,
    plugins: PluginSet,
    store: ReleaseStore,
    metrics: std::sync::Arc<MetricsCollector>,
    timing: Timing,
    state_tx: watch::Sender<State>,
    waiters: Vec<oneshot::Sender<State>>,
}

impl StateMachine {
    /// Spawn the driver task for a release and return its handle.
    pub fn start(
        release: Release,
        plugins: PluginSet,
        store: ReleaseStore,
        metrics: std::sync::Arc<MetricsCollector>,
        timing: Timing,
    ) -> MachineHandle {
        let (state_tx, state_rx) = watch::channel(release.current_state);
        let (tx, rx) = mpsc::channel(16);

        let machine = Self {
            release,
            plugins,
            store,
            metrics,
            timing,
            state_tx,
            waiters: Vec::new(),
        };
        tokio::spawn(machine.run(rx));

        MachineHandle { tx, state_rx }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Apply { event, reply } => {
                    let current = self.release.current_state;
                    if transition(current, &event).is_none() {
                        let _ = reply.send(Err(LifecycleError::InvalidTransition {
                            state: current,
                            event: event.to_string(),
                        }));
                        continue;
                    }

                    let _ = reply.send(Ok(self.settled()));
                    self.drive(Some(event)).await;
                }
                Command::Resume { reply } => {
                    let _ = reply.send(Ok(self.settled()));

                    let state = self.release.current_state;
                    info!(release = %self.release.name, %state, "resuming release");

                    if matches!(state, State::Start | State::Idle | State::Fail) {
                        self.resolve_waiters(state);
                        continue;
                    }
                    let follow = self.run_action(state, None).await;
                    self.drive(follow).await;
                }
            }
        }
        debug!(release = %self.release.name, "state machine stopped");
    }

    fn settled(&mut self) -> Settled {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Settled(rx)
    }

    fn resolve_waiters(&mut self, state: State) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(state);
        }
    }

    /// Apply an event, run the entered state's action, and keep applying
    /// any follow-up events the actions raise until the machine settles.
    async fn drive(&mut self, first: Option<Event>) {
        let mut pending = first;
        while let Some(event) = pending.take() {
            let current = self.release.current_state;
            let Some(next) = transition(current, &event) else {
                warn!(
                    release = %self.release.name,
                    %event, state = %current,
                    "dropping event with no valid transition"
                );
                break;
            };

            debug!(release = %self.release.name, %event, from = %current, to = %next, "transition");

            let traffic = match event {
                Event::Healthy { traffic } => Some(traffic),
                _ => None,
            };
            self.enter(next);
            pending = self.run_action(next, traffic).await;
        }
    }

    /// Record the new state on the release and persist it. Persistence
    /// failures are logged but do not interrupt the rollout.
    fn enter(&mut self, state: State) {
        self.release.update_state(state);
        self.metrics
            .record_state_entered(&self.release.name, state.as_str());
        self.state_tx.send_replace(state);

        if let Err(error) = self.store.upsert_release(&self.release) {
            error!(
                release = %self.release.name, %state, %error,
                "unable to persist release state"
            );
        }
    }

    /// Run the action for a state, bounded by the state timeout, and
    /// return the follow-up event if any.
    async fn run_action(&mut self, state: State, traffic: Option<i32>) -> Option<Event> {
        match state {
            State::Start => return None,
            State::Idle | State::Fail => {
                self.resolve_waiters(state);
                return None;
            }
            _ => {}
        }

        let _timer = self.metrics.time_state(&self.release.name, state.as_str());
        let bound = self.timing.state_timeout;
        let outcome = match state {
            State::Configure => timeout(bound, self.action_configure()).await,
            State::Deploy => timeout(bound, self.action_deploy()).await,
            State::Monitor => timeout(bound, self.action_monitor()).await,
            State::Scale => timeout(bound, self.action_scale(traffic)).await,
            State::Promote => timeout(bound, self.action_promote()).await,
            State::Rollback => timeout(bound, self.action_rollback()).await,
            State::Destroy => timeout(bound, self.action_destroy()).await,
            State::Start | State::Idle | State::Fail => unreachable!(),
        };

        match outcome {
            Ok(event) => Some(event),
            Err(_) => {
                error!(
                    release = %self.release.name, %state, timeout = ?bound,
                    "state action timed out"
                );
                Some(Event::Fail)
            }
        }
    }

    async fn action_configure(&mut self) -> Event {
        if let Err(error) = self.plugins.releaser.setup().await {
            error!(release = %self.release.name, %error, "configure failed");
            return Event::Fail;
        }

        tokio::time::sleep(self.timing.step_delay).await;

        let status = match self.plugins.runtime.init_primary().await {
            Ok(status) => status,
            Err(error) => {
                error!(release = %self.release.name, %error, "configure failed");
                return Event::Fail;
            }
        };

        // A deployment already existed: adopt it as the primary and
        // route all traffic there before going idle.
        if status == DeploymentStatus::Update {
            if let Err(error) = self.settle_on_primary().await {
                error!(release = %self.release.name, %error, "configure failed");
                return Event::Fail;
            }
        }

        debug!(release = %self.release.name, "configure complete");
        Event::Configured
    }

    async fn action_deploy(&mut self) -> Event {
        // Deploy fires before the platform has admitted the new
        // workload; give it a moment to appear.
        tokio::time::sleep(self.timing.step_delay).await;

        let status = match self.plugins.runtime.init_primary().await {
            Ok(status) => status,
            Err(error) => {
                error!(release = %self.release.name, %error, "deploy failed");
                return Event::Fail;
            }
        };

        if let Err(error) = self
            .plugins
            .releaser
            .wait_until_healthy(ServiceVariant::Primary)
            .await
        {
            error!(release = %self.release.name, %error, "deploy failed");
            return Event::Fail;
        }

        if let Err(error) = self.plugins.releaser.scale(0).await {
            error!(release = %self.release.name, %error, "deploy failed");
            return Event::Fail;
        }

        // First ever deploy: the candidate became the primary, there is
        // nothing to compare it against, so skip the strategy.
        if status == DeploymentStatus::Update {
            tokio::time::sleep(self.timing.step_delay).await;

            if let Err(error) = self.plugins.runtime.remove_candidate().await {
                error!(release = %self.release.name, %error, "deploy failed");
                return Event::Fail;
            }

            info!(release = %self.release.name, "created primary, waiting for next deployment");
            return Event::Complete;
        }

        info!(release = %self.release.name, "deploy complete, executing strategy");
        Event::Deployed
    }

    async fn action_monitor(&mut self) -> Event {
        use gradient_plugins::StrategyStatus::*;

        match self.plugins.strategy.execute().await {
            Ok((Success, traffic)) => {
                debug!(release = %self.release.name, traffic, "checks passed, candidate healthy");
                Event::Healthy { traffic }
            }
            Ok((Complete, _)) => {
                info!(release = %self.release.name, "strategy complete, promoting candidate");
                Event::Complete
            }
            Ok((Fail, _)) => {
                warn!(release = %self.release.name, "checks failed, candidate unhealthy");
                Event::Unhealthy
            }
            Err(error) => {
                error!(release = %self.release.name, %error, "strategy failed");
                Event::Fail
            }
        }
    }

    async fn action_scale(&mut self, traffic: Option<i32>) -> Event {
        let Some(traffic) = traffic else {
            error!(release = %self.release.name, "no traffic percentage in event payload");
            return Event::Fail;
        };

        if let Err(error) = self.plugins.releaser.scale(traffic).await {
            error!(release = %self.release.name, %error, "scale failed");
            return Event::Fail;
        }

        debug!(release = %self.release.name, traffic, "scaled candidate traffic");
        Event::Scaled
    }

    async fn action_promote(&mut self) -> Event {
        // Drain the primary before swapping it out.
        if let Err(error) = self.plugins.releaser.scale(100).await {
            error!(release = %self.release.name, %error, "promote failed");
            return Event::Fail;
        }

        tokio::time::sleep(self.timing.step_delay).await;

        if let Err(error) = self.plugins.runtime.promote_candidate().await {
            error!(release = %self.release.name, %error, "promote failed");
            return Event::Fail;
        }

        if let Err(error) = self.settle_on_primary().await {
            error!(release = %self.release.name, %error, "promote failed");
            return Event::Fail;
        }

        info!(release = %self.release.name, "candidate promoted to primary");
        Event::Promoted
    }

    async fn action_rollback(&mut self) -> Event {
        if let Err(error) = self.plugins.releaser.scale(0).await {
            error!(release = %self.release.name, %error, "rollback failed");
            return Event::Fail;
        }

        tokio::time::sleep(self.timing.step_delay).await;

        if let Err(error) = self.plugins.runtime.remove_candidate().await {
            error!(release = %self.release.name, %error, "rollback failed");
            return Event::Fail;
        }

        warn!(release = %self.release.name, "deployment rolled back");
        Event::Complete
    }

    async fn action_destroy(&mut self) -> Event {
        if let Err(error) = self.plugins.runtime.restore_original().await {
            error!(release = %self.release.name, %error, "destroy failed");
            return Event::Fail;
        }

        if let Err(error) = self
            .plugins
            .releaser
            .wait_until_healthy(ServiceVariant::Candidate)
            .await
        {
            error!(release = %self.release.name, %error, "destroy failed");
            return Event::Fail;
        }

        // All traffic back on the restored workload before the mesh
        // resources disappear.
        if let Err(error) = self.plugins.releaser.scale(100).await {
            error!(release = %self.release.name, %error, "destroy failed");
            return Event::Fail;
        }

        tokio::time::sleep(self.timing.step_delay).await;

        if let Err(error) = self.plugins.runtime.remove_primary().await {
            error!(release = %self.release.name, %error, "destroy failed");
            return Event::Fail;
        }

        if let Err(error) = self.plugins.releaser.destroy().await {
            error!(release = %self.release.name, %error, "destroy failed");
            return Event::Fail;
        }

        info!(release = %self.release.name, "release destroyed");
        Event::Complete
    }

    /// Route all traffic to a healthy primary, then retire the candidate.
    async fn settle_on_primary(&mut self) -> Result<(), gradient_plugins::PluginError> {
        self.plugins
            .releaser
            .wait_until_healthy(ServiceVariant::Primary)
            .await?;
        self.plugins.releaser.scale(0).await?;

        tokio::time::sleep(self.timing.step_delay).await;

        self.plugins.runtime.remove_candidate().await
    }
}
