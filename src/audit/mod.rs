//! Multi-page audit orchestration.
//!
//! The run controller gates a run, the scheduler drives page analyses and
//! the tracker holds per-page lifecycle state.

pub mod controller;
pub mod scheduler;
pub mod tracker;

pub use controller::{AuditRun, RunController};
pub use scheduler::SchedulerConfig;
