//! Provider errors.

use gradient_lifecycle::LifecycleError;
use gradient_model::State;
use gradient_plugins::ConfigError;
use gradient_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown {kind} plugin {name:?}")]
    UnknownPlugin { kind: &'static str, name: String },

    #[error("invalid {kind} plugin config: {source}")]
    Config {
        kind: &'static str,
        source: ConfigError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("no active machine for release {0:?}")]
    NoMachine(String),

    #[error("destroy of release {name:?} ended in state {state}")]
    DestroyFailed { name: String, state: State },
}

impl ProviderError {
    /// True for faults in the release definition itself (unknown plugin
    /// or invalid config), which callers map to a client error.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            ProviderError::UnknownPlugin { .. } | ProviderError::Config { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ProviderError::Store(e) => e.is_not_found(),
            ProviderError::NoMachine(_) => true,
            _ => false,
        }
    }
}
