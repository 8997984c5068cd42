//! Analysis modules.
//!
//! Domain-level rollups computed from page slot snapshots.

pub mod aggregator;

pub use aggregator::*;
