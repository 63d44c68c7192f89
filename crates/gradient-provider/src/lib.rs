//! gradient-provider — plugin registry and release management.
//!
//! The [`Provider`] is the seam between the outer surfaces (API,
//! admission) and the core: it owns the [`ReleaseStore`], the client
//! seams, and one running state machine per release. Plugins are
//! selected by name from a closed, compile-time registry.
//!
//! [`ReleaseStore`]: gradient_store::ReleaseStore

pub mod error;
pub mod provider;
pub mod registry;
pub mod state;

pub use error::ProviderError;
pub use provider::Provider;
pub use registry::{build_plugins, Clients};
pub use state::StorePluginState;
