//! Auto-merge queue
//!
//! Two-layer pattern:
//! 1. Decide - aggregate CI and precheck the PR (`ci`, pure, testable)
//! 2. Act - trigger tests, update branches, merge (`scheduler`, effectful)

mod ci;
mod scheduler;

pub use ci::{CiVerdict, Precheck, aggregate_ci, merge_title, precheck};
pub use scheduler::{JobResult, MergeScheduler, MergeSettings, TickOutcome};
