//! The Strategy contract — the traffic-shifting policy.

use async_trait::async_trait;

use crate::error::{ConfigError, PluginError};

/// Outcome of one strategy step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyStatus {
    /// Checks passed; continue ramping at the returned traffic value.
    Success,
    /// The ramp reached its target; promote the candidate.
    Complete,
    /// Checks failed past the error threshold; roll back.
    Fail,
}

/// Decides how candidate traffic ramps based on monitor results.
///
/// `execute` returns the status together with the traffic percentage to
/// apply (0–100). Internal faults are reported through `Err` and route
/// the state machine to `Fail` without a rollback step.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn configure(
        &mut self,
        name: &str,
        namespace: &str,
        config: &serde_json::Value,
    ) -> Result<(), ConfigError>;

    async fn execute(&mut self) -> Result<(StrategyStatus, i32), PluginError>;
}
