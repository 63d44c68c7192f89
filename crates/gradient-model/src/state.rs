//! Lifecycle states for a release.

use serde::{Deserialize, Serialize};

/// State of the release lifecycle machine.
///
/// Persisted with the release record as a snake_case name. An unknown
/// name in stored data fails deserialization; a corrupt state is a load
/// error, never silently coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    /// Machine constructed, nothing configured yet.
    Start,
    /// Setting up mesh resources and the primary workload.
    Configure,
    /// Configured and waiting for a candidate deployment.
    Idle,
    /// A new candidate has arrived; preparing the rollout.
    Deploy,
    /// Executing the strategy: observing candidate health.
    Monitor,
    /// Applying a new traffic split.
    Scale,
    /// Promoting the candidate to primary.
    Promote,
    /// Returning all traffic to the primary after failed checks.
    Rollback,
    /// Tearing down mesh resources and controller-owned workloads.
    Destroy,
    /// A state action failed; recoverable via Configure or Deploy.
    Fail,
}

impl State {
    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Start => "start",
            State::Configure => "configure",
            State::Idle => "idle",
            State::Deploy => "deploy",
            State::Monitor => "monitor",
            State::Scale => "scale",
            State::Promote => "promote",
            State::Rollback => "rollback",
            State::Destroy => "destroy",
            State::Fail => "fail",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
