//! gradient-model — domain types for the Gradient control plane.
//!
//! A [`Release`] binds a name/namespace to the four plugin configurations
//! (releaser, runtime, monitor, strategy) and the current rollout state.
//! Releases are serialized to JSON for storage; the state history is an
//! append-only audit trail of lifecycle transitions.

pub mod release;
pub mod state;

pub use release::{PluginConfig, Release, StateHistoryEntry, epoch_secs};
pub use state::State;
