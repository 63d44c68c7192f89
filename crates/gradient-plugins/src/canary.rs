//! Built-in canary strategy.
//!
//! Ramps candidate traffic in fixed steps, running the monitor's checks
//! between steps. A failed check is retried after another interval;
//! `error_threshold` consecutive failures abort the ramp. Reaching the
//! maximum completes it. Both terminal outcomes reset the persisted
//! position so the next rollout starts from scratch.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::duration::parse_duration;
use crate::error::{ConfigError, PluginError};
use crate::monitor::Monitor;
use crate::state::PluginStateStore;
use crate::strategy::{Strategy, StrategyStatus};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CanaryConfig {
    /// Time between traffic steps, e.g. "30s".
    #[serde(default)]
    interval: String,
    /// Wait before the very first step; defaults to `interval`.
    #[serde(default)]
    initial_delay: String,
    /// Traffic percentage for the first step; defaults to
    /// `traffic_step` when zero.
    #[serde(default)]
    initial_traffic: i32,
    /// Percentage added per passing step.
    #[serde(default)]
    traffic_step: i32,
    /// Ramp target; reaching it completes the release.
    #[serde(default)]
    max_traffic: i32,
    /// Consecutive failed checks tolerated before aborting.
    #[serde(default = "default_error_threshold")]
    error_threshold: u32,
}

fn default_error_threshold() -> u32 {
    5
}

/// Sentinel meaning "no traffic assigned yet".
const TRAFFIC_UNSET: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CanaryState {
    candidate_traffic: i32,
    current_errors: u32,
}

impl Default for CanaryState {
    fn default() -> Self {
        Self {
            candidate_traffic: TRAFFIC_UNSET,
            current_errors: 0,
        }
    }
}

/// The built-in `canary` strategy plugin.
pub struct CanaryStrategy {
    monitor: Arc<dyn Monitor>,
    state_store: Arc<dyn PluginStateStore>,
    name: String,
    config: CanaryConfig,
    interval: std::time::Duration,
    initial_delay: std::time::Duration,
    state: CanaryState,
}

impl CanaryStrategy {
    pub fn new(monitor: Arc<dyn Monitor>, state_store: Arc<dyn PluginStateStore>) -> Self {
        Self {
            monitor,
            state_store,
            name: String::new(),
            config: CanaryConfig::default(),
            interval: std::time::Duration::ZERO,
            initial_delay: std::time::Duration::ZERO,
            state: CanaryState::default(),
        }
    }

    fn save_state(&self) {
        match serde_json::to_vec(&self.state) {
            Ok(data) => self.state_store.save(&data),
            Err(error) => warn!(%error, release = %self.name, "unable to serialize canary state"),
        }
    }
}

#[async_trait]
impl Strategy for CanaryStrategy {
    fn configure(
        &mut self,
        name: &str,
        _namespace: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError> {
        let parsed: CanaryConfig = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::Decode(e.to_string()))?;

        let mut problems = Vec::new();

        match parse_duration(&parsed.interval) {
            Ok(d) => self.interval = d,
            Err(e) => problems.push(format!("interval: {e}")),
        }
        if parsed.initial_delay.is_empty() {
            self.initial_delay = self.interval;
        } else {
            match parse_duration(&parsed.initial_delay) {
                Ok(d) => self.initial_delay = d,
                Err(e) => problems.push(format!("initial_delay: {e}")),
            }
        }
        if !(1..=100).contains(&parsed.traffic_step) {
            problems.push("traffic_step: must be between 1 and 100".to_string());
        }
        if !(1..=100).contains(&parsed.max_traffic) {
            problems.push("max_traffic: must be between 1 and 100".to_string());
        }
        if !(0..=100).contains(&parsed.initial_traffic) {
            problems.push("initial_traffic: must be between 0 and 100".to_string());
        }
        if parsed.error_threshold < 1 {
            problems.push("error_threshold: must be at least 1".to_string());
        }

        if !problems.is_empty() {
            return Err(ConfigError::Validation(problems));
        }

        self.name = name.to_string();
        self.config = parsed;

        if let Some(data) = self.state_store.load() {
            match serde_json::from_slice(&data) {
                Ok(state) => self.state = state,
                Err(error) => {
                    warn!(%error, release = %self.name, "discarding unreadable canary state")
                }
            }
        }

        Ok(())
    }

    async fn execute(&mut self) -> Result<(StrategyStatus, i32), PluginError> {
        // First step: assign the initial traffic without checking, the
        // candidate has not served requests yet.
        if self.state.candidate_traffic == TRAFFIC_UNSET {
            tokio::time::sleep(self.initial_delay).await;

            self.state.candidate_traffic = if self.config.initial_traffic > 0 {
                self.config.initial_traffic
            } else {
                self.config.traffic_step
            };
            self.save_state();

            info!(
                release = %self.name,
                traffic = self.state.candidate_traffic,
                "starting canary rollout"
            );
            return Ok((StrategyStatus::Success, self.state.candidate_traffic));
        }

        // Check, retrying after the interval on failure, until a check
        // passes or the consecutive-failure threshold is exhausted.
        loop {
            tokio::time::sleep(self.interval).await;

            match self.monitor.check(self.interval).await {
                Ok(()) => break,
                Err(check) if check.is_config() => return Err(check.into()),
                Err(check) => {
                    self.state.current_errors += 1;
                    self.save_state();
                    warn!(
                        release = %self.name,
                        errors = self.state.current_errors,
                        threshold = self.config.error_threshold,
                        %check,
                        "canary check failed"
                    );

                    if self.state.current_errors >= self.config.error_threshold {
                        self.state = CanaryState::default();
                        self.save_state();
                        return Ok((StrategyStatus::Fail, 0));
                    }
                }
            }
        }

        self.state.current_errors = 0;
        self.state.candidate_traffic += self.config.traffic_step;
        self.save_state();

        if self.state.candidate_traffic >= self.config.max_traffic {
            info!(release = %self.name, "canary rollout reached target traffic");
            self.state = CanaryState::default();
            self.save_state();
            return Ok((StrategyStatus::Complete, 100));
        }

        debug!(
            release = %self.name,
            traffic = self.state.candidate_traffic,
            "canary checks passed, increasing traffic"
        );
        Ok((StrategyStatus::Success, self.state.candidate_traffic))
    }
}
