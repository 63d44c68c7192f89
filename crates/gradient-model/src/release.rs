//! The release record — the unit of orchestration.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::state::State;

/// Maximum number of entries kept in a release's state history.
const HISTORY_CAP: usize = 50;

/// Current unix timestamp in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Configuration slot for one plugin. The config blob is opaque to the
/// core and only interpretable by the named plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginConfig {
    pub plugin_name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One entry in a release's append-only state history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StateHistoryEntry {
    /// Unix timestamp (seconds) of the transition.
    pub time: u64,
    pub state: State,
}

/// A release binds a name/namespace to its four plugin configs and the
/// current rollout state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub name: String,
    pub namespace: String,

    /// Opaque version string correlating a deployment generation to this
    /// release; used to detect whether an incoming event is a new rollout.
    #[serde(default)]
    pub version: String,

    pub releaser: PluginConfig,
    pub runtime: PluginConfig,
    pub monitor: PluginConfig,
    pub strategy: PluginConfig,

    #[serde(default = "initial_state")]
    pub current_state: State,
    #[serde(default)]
    pub state_history: Vec<StateHistoryEntry>,

    /// Unix timestamp (seconds) when this release was created.
    #[serde(default)]
    pub created: u64,
    /// Unix timestamp (seconds) of the last state change.
    #[serde(default)]
    pub last_updated: u64,
}

fn initial_state() -> State {
    State::Start
}

impl Release {
    /// Record a transition: set the current state, append to the history,
    /// and bump `last_updated`. The history is capped to the most recent
    /// [`HISTORY_CAP`] entries.
    pub fn update_state(&mut self, state: State) {
        let now = epoch_secs();
        self.current_state = state;
        self.state_history.push(StateHistoryEntry { time: now, state });
        if self.state_history.len() > HISTORY_CAP {
            let excess = self.state_history.len() - HISTORY_CAP;
            self.state_history.drain(..excess);
        }
        self.last_updated = now;
    }

    /// True if the history contains the given state.
    pub fn passed_through(&self, state: State) -> bool {
        self.state_history.iter().any(|e| e.state == state)
    }
}
