//! Best-effort persistence seam for per-plugin state.

/// Durable storage for one plugin's opaque state blob, scoped to a
/// single release + plugin kind by the provider.
///
/// Persistence is best-effort: implementations log failures internally
/// rather than surfacing them, so a storage hiccup never strands a
/// rollout mid-sequence.
pub trait PluginStateStore: Send + Sync {
    /// Load the previously stored blob, or `None`.
    fn load(&self) -> Option<Vec<u8>>;

    /// Store a new blob, replacing any previous one.
    fn save(&self, data: &[u8]);
}

/// A state store that remembers nothing. Useful for plugins without
/// state and for tests.
#[derive(Debug, Default)]
pub struct NullPluginState;

impl PluginStateStore for NullPluginState {
    fn load(&self) -> Option<Vec<u8>> {
        None
    }

    fn save(&self, _data: &[u8]) {}
}

/// In-memory state store used by tests to observe what a plugin saves.
#[derive(Debug, Default)]
pub struct MemoryPluginState {
    data: std::sync::Mutex<Option<Vec<u8>>>,
}

impl PluginStateStore for MemoryPluginState {
    fn load(&self) -> Option<Vec<u8>> {
        self.data.lock().unwrap().clone()
    }

    fn save(&self, data: &[u8]) {
        *self.data.lock().unwrap() = Some(data.to_vec());
    }
}
