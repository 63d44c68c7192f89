//! gradient-store — embedded release store for Gradient.
//!
//! Backed by [redb](https://docs.rs/redb), persists release records and
//! opaque per-plugin state blobs. Values are JSON-serialized into redb's
//! `&[u8]` value columns.
//!
//! The `ReleaseStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and is the only durable shared resource in the
//! system; the lifecycle machine, admission layer, and API all go
//! through it.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use store::{ListOptions, ReleaseStore};
