//! Metrics collector — tracks per-release lifecycle metrics.
//!
//! Counters live behind a mutex-protected map keyed by release and
//! state; recording is synchronous so it can happen anywhere in the
//! lifecycle code, including drop handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Default)]
struct StateCounters {
    entered: u64,
    duration: Duration,
    timings: u64,
}

/// Point-in-time copy of everything the collector tracks, ordered for
/// stable rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// `(release, state, times entered, total action seconds, timings)`.
    pub states: Vec<(String, String, u64, f64, u64)>,
    /// `(decision, count)` of admission outcomes.
    pub admission: Vec<(String, u64)>,
    /// Releases currently registered with the provider.
    pub active_releases: u64,
}

/// Collects lifecycle metrics across all releases.
#[derive(Default)]
pub struct MetricsCollector {
    states: Mutex<HashMap<(String, String), StateCounters>>,
    admission: Mutex<HashMap<String, u64>>,
    active_releases: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count a state transition for a release.
    pub fn record_state_entered(&self, release: &str, state: &str) {
        let mut states = self.states.lock().unwrap();
        states
            .entry((release.to_string(), state.to_string()))
            .or_default()
            .entered += 1;
        debug!(release, state, "state entered");
    }

    /// Start timing a state action. The returned guard records the
    /// elapsed time when dropped.
    pub fn time_state(self: &Arc<Self>, release: &str, state: &str) -> StateTimer {
        StateTimer {
            collector: Arc::clone(self),
            release: release.to_string(),
            state: state.to_string(),
            started: Instant::now(),
        }
    }

    fn record_state_duration(&self, release: &str, state: &str, elapsed: Duration) {
        let mut states = self.states.lock().unwrap();
        let counters = states
            .entry((release.to_string(), state.to_string()))
            .or_default();
        counters.duration += elapsed;
        counters.timings += 1;
    }

    /// Count an admission decision by outcome, e.g. `"deployed"`,
    /// `"no_release"`, `"controller_update"`.
    pub fn record_admission(&self, decision: &str) {
        *self
            .admission
            .lock()
            .unwrap()
            .entry(decision.to_string())
            .or_default() += 1;
    }

    /// Set the number of releases the provider currently manages.
    pub fn set_active_releases(&self, count: u64) {
        self.active_releases.store(count, Ordering::Relaxed);
    }

    /// Take an ordered snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let states = self.states.lock().unwrap();
        let mut state_rows: Vec<_> = states
            .iter()
            .map(|((release, state), c)| {
                (
                    release.clone(),
                    state.clone(),
                    c.entered,
                    c.duration.as_secs_f64(),
                    c.timings,
                )
            })
            .collect();
        state_rows.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        drop(states);

        let admission = self.admission.lock().unwrap();
        let mut admission_rows: Vec<_> = admission
            .iter()
            .map(|(decision, count)| (decision.clone(), *count))
            .collect();
        admission_rows.sort();
        drop(admission);

        MetricsSnapshot {
            states: state_rows,
            admission: admission_rows,
            active_releases: self.active_releases.load(Ordering::Relaxed),
        }
    }
}

/// Records the time a state action took when dropped.
pub struct StateTimer {
    collector: Arc<MetricsCollector>,
    release: String,
    state: String,
    started: Instant,
}

impl Drop for StateTimer {
    fn drop(&mut self) {
        self.collector
            .record_state_duration(&self.release, &self.state, self.started.elapsed());
    }
}
