//! gradient-metrics — observability for release rollouts.
//!
//! Tracks per-release lifecycle metrics (state entries, time spent in
//! state actions, admission decisions) and provides Prometheus-compatible
//! text exposition.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── record_state_entered() ← called on every state transition
//!   ├── time_state() → records action duration on drop of the guard
//!   └── snapshot() → point-in-time MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{MetricsCollector, MetricsSnapshot};
pub use prometheus::render_prometheus;
