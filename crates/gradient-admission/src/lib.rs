//! gradient-admission — routes platform deployment events to releases.
//!
//! The admission layer receives a notification whenever a workload is
//! deployed on the platform and decides whether that deployment starts
//! a rollout: it ignores the controller's own writes, matches the
//! workload name against each release's runtime selector, and starts a
//! new rollout only when the matching release is settled.

pub mod admission;

pub use admission::{AdmissionCheck, AdmissionError, Decision, WorkloadEvent};
