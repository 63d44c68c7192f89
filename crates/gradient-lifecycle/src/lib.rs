//! gradient-lifecycle — the release state machine.
//!
//! A release moves through a fixed lifecycle: `Start → Configure → Idle`,
//! then `Deploy → Monitor ⇄ Scale → Promote → Idle` for each rollout,
//! with `Rollback` on failed checks, `Destroy` for teardown, and `Fail`
//! as the recoverable error state.
//!
//! The transition table is a pure function ([`transition`]); all side
//! effects live in state actions run by a per-release driver task
//! ([`StateMachine`]). Actions are strictly sequential per release and
//! bounded by a state timeout.

pub mod event;
pub mod machine;
pub mod transition;

pub use event::Event;
pub use machine::{
    LifecycleError, MachineHandle, PluginSet, Settled, StateMachine, Timing,
};
pub use transition::transition;
