//! redb table definitions for the Gradient release store.
//!
//! Both tables use `&str` keys and `&[u8]` values (JSON-serialized).

use redb::TableDefinition;

/// Release records keyed by release name (unique system-wide).
pub const RELEASES: TableDefinition<&str, &[u8]> = TableDefinition::new("releases");

/// Opaque per-plugin state blobs keyed by `{release}/{plugin_kind}`,
/// e.g. `payments/runtime`.
pub const PLUGIN_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("plugin_state");
