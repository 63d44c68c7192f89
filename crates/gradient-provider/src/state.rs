//! Store-backed plugin state.

use gradient_plugins::PluginStateStore;
use gradient_store::ReleaseStore;
use tracing::warn;

/// Persists one plugin's opaque state blob under
/// `{release}/{plugin_kind}` in the release store.
///
/// Load and save are best-effort: a storage failure is logged and the
/// plugin continues with what it has, so a store hiccup never strands a
/// rollout mid-sequence.
pub struct StorePluginState {
    store: ReleaseStore,
    release: String,
    kind: &'static str,
}

impl StorePluginState {
    pub fn new(store: ReleaseStore, release: &str, kind: &'static str) -> Self {
        Self {
            store,
            release: release.to_string(),
            kind,
        }
    }
}

impl PluginStateStore for StorePluginState {
    fn load(&self) -> Option<Vec<u8>> {
        match self.store.get_plugin_state(&self.release, self.kind) {
            Ok(data) => data,
            Err(error) => {
                warn!(release = %self.release, kind = self.kind, %error, "unable to load plugin state");
                None
            }
        }
    }

    fn save(&self, data: &[u8]) {
        if let Err(error) = self.store.upsert_plugin_state(&self.release, self.kind, data) {
            warn!(release = %self.release, kind = self.kind, %error, "unable to save plugin state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_the_store() {
        let store = ReleaseStore::open_in_memory().unwrap();
        let state = StorePluginState::new(store.clone(), "api", "strategy");

        assert!(state.load().is_none());
        state.save(b"{\"candidate_traffic\":20}");
        assert_eq!(state.load().unwrap(), b"{\"candidate_traffic\":20}");

        // Scoped per plugin kind.
        let other = StorePluginState::new(store, "api", "runtime");
        assert!(other.load().is_none());
    }
}
