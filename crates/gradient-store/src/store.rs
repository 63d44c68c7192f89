//! ReleaseStore — redb-backed persistence for releases and plugin state.
//!
//! Supports both on-disk and in-memory backends (the latter for testing
//! and single-process mode).

use std::path::Path;
use std::sync::Arc;

use gradient_model::Release;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::{PLUGIN_STATE, RELEASES};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Query options for listing releases.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// When set, only releases whose runtime plugin name matches.
    pub runtime: Option<String>,
}

/// Thread-safe release store backed by redb.
#[derive(Clone)]
pub struct ReleaseStore {
    db: Arc<Database>,
}

impl ReleaseStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "release store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory release store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.open_table(PLUGIN_STATE).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Create or replace a release by name.
    pub fn upsert_release(&self, release: &Release) -> StoreResult<()> {
        let value = serde_json::to_vec(release).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            table
                .insert(release.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(release = %release.name, state = %release.current_state, "release stored");
        Ok(())
    }

    /// Get a release by name. Returns the `ReleaseNotFound` sentinel when
    /// absent; any other error is an internal storage fault.
    pub fn get_release(&self, name: &str) -> StoreResult<Release> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let release: Release =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(release)
            }
            None => Err(StoreError::ReleaseNotFound(name.to_string())),
        }
    }

    /// List releases, filtered by runtime plugin name when set.
    pub fn list_releases(&self, options: &ListOptions) -> StoreResult<Vec<Release>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let release: Release =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if let Some(runtime) = &options.runtime {
                if &release.runtime.plugin_name != runtime {
                    continue;
                }
            }
            results.push(release);
        }
        Ok(results)
    }

    /// Delete a release and its plugin state. Returns true if it existed.
    pub fn delete_release(&self, name: &str) -> StoreResult<bool> {
        // Collect plugin-state keys for this release first.
        let prefix = format!("{name}/");
        let state_keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(PLUGIN_STATE).map_err(map_err!(Table))?;
            table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect()
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();

            let mut states = txn.open_table(PLUGIN_STATE).map_err(map_err!(Table))?;
            for key in &state_keys {
                states.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(release = %name, existed, "release deleted");
        Ok(existed)
    }

    // ── Plugin state ───────────────────────────────────────────────

    /// Store an opaque state blob for one plugin of a release.
    pub fn upsert_plugin_state(
        &self,
        release: &str,
        plugin_kind: &str,
        data: &[u8],
    ) -> StoreResult<()> {
        let key = plugin_state_key(release, plugin_kind);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PLUGIN_STATE).map_err(map_err!(Table))?;
            table.insert(key.as_str(), data).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Fetch a plugin state blob, or `None` when never stored.
    pub fn get_plugin_state(
        &self,
        release: &str,
        plugin_kind: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        let key = plugin_state_key(release, plugin_kind);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PLUGIN_STATE).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(guard.value().to_vec())),
            None => Ok(None),
        }
    }
}

fn plugin_state_key(release: &str, plugin_kind: &str) -> String {
    format!("{release}/{plugin_kind}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradient_model::{PluginConfig, State};

    fn test_release(name: &str, runtime: &str) -> Release {
        Release {
            name: name.to_string(),
            namespace: "default".to_string(),
            version: "1".to_string(),
            releaser: PluginConfig {
                plugin_name: "mesh".to_string(),
                config: serde_json::json!({"service": name}),
            },
            runtime: PluginConfig {
                plugin_name: runtime.to_string(),
                config: serde_json::json!({"deployment": name, "namespace": "default"}),
            },
            monitor: PluginConfig {
                plugin_name: "metrics".to_string(),
                config: serde_json::Value::Null,
            },
            strategy: PluginConfig {
                plugin_name: "canary".to_string(),
                config: serde_json::Value::Null,
            },
            current_state: State::Start,
            state_history: vec![],
            created: 1000,
            last_updated: 1000,
        }
    }

    #[test]
    fn upsert_and_get() {
        let store = ReleaseStore::open_in_memory().unwrap();
        let rel = test_release("payments", "orchestrator");

        store.upsert_release(&rel).unwrap();
        let retrieved = store.get_release("payments").unwrap();

        assert_eq!(retrieved, rel);
    }

    #[test]
    fn get_missing_returns_not_found_sentinel() {
        let store = ReleaseStore::open_in_memory().unwrap();
        let err = store.get_release("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn upsert_replaces_by_name() {
        let store = ReleaseStore::open_in_memory().unwrap();
        let mut rel = test_release("payments", "orchestrator");
        store.upsert_release(&rel).unwrap();

        rel.update_state(State::Idle);
        store.upsert_release(&rel).unwrap();

        let retrieved = store.get_release("payments").unwrap();
        assert_eq!(retrieved.current_state, State::Idle);
        assert_eq!(store.list_releases(&ListOptions::default()).unwrap().len(), 1);
    }

    #[test]
    fn list_filters_by_runtime() {
        let store = ReleaseStore::open_in_memory().unwrap();
        store.upsert_release(&test_release("a", "orchestrator")).unwrap();
        store.upsert_release(&test_release("b", "orchestrator")).unwrap();
        store.upsert_release(&test_release("c", "other")).unwrap();

        let all = store.list_releases(&ListOptions::default()).unwrap();
        assert_eq!(all.len(), 3);

        let filtered = store
            .list_releases(&ListOptions {
                runtime: Some("orchestrator".to_string()),
            })
            .unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn delete_removes_release_and_plugin_state() {
        let store = ReleaseStore::open_in_memory().unwrap();
        store.upsert_release(&test_release("payments", "orchestrator")).unwrap();
        store
            .upsert_plugin_state("payments", "runtime", b"{\"candidate_name\":\"payments\"}")
            .unwrap();

        assert!(store.delete_release("payments").unwrap());
        assert!(!store.delete_release("payments").unwrap());
        assert!(store.get_release("payments").unwrap_err().is_not_found());
        assert!(store.get_plugin_state("payments", "runtime").unwrap().is_none());
    }

    #[test]
    fn plugin_state_roundtrip() {
        let store = ReleaseStore::open_in_memory().unwrap();

        assert!(store.get_plugin_state("payments", "strategy").unwrap().is_none());

        store
            .upsert_plugin_state("payments", "strategy", b"{\"candidate_traffic\":20}")
            .unwrap();
        let blob = store.get_plugin_state("payments", "strategy").unwrap().unwrap();
        assert_eq!(blob, b"{\"candidate_traffic\":20}");

        // Keys are scoped per plugin kind.
        assert!(store.get_plugin_state("payments", "runtime").unwrap().is_none());
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("gradient.redb");

        {
            let store = ReleaseStore::open(&db_path).unwrap();
            let mut rel = test_release("payments", "orchestrator");
            rel.update_state(State::Monitor);
            store.upsert_release(&rel).unwrap();
        }

        // Reopen the same database file; the persisted state survives.
        let store = ReleaseStore::open(&db_path).unwrap();
        let rel = store.get_release("payments").unwrap();
        assert_eq!(rel.current_state, State::Monitor);
    }

    #[test]
    fn corrupt_release_record_is_a_load_error() {
        let store = ReleaseStore::open_in_memory().unwrap();

        // Write garbage directly into the releases table.
        let txn = store.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(RELEASES).unwrap();
            table
                .insert("broken", b"{\"name\":\"broken\",\"current_state\":\"bogus\"}".as_slice())
                .unwrap();
        }
        txn.commit().unwrap();

        let err = store.get_release("broken").unwrap_err();
        assert!(matches!(err, StoreError::Deserialize(_)));
    }
}
