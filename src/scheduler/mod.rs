//! Status scheduler
//!
//! - `batch` - visible-first, round-robin batch planning
//! - `probe` - refresh of one instance against the multiplexer
//! - `worker` - the single background worker and its handle

pub mod batch;
mod probe;
pub mod worker;

pub use batch::{BatchPlan, select_batch};
pub use worker::{StatusScheduler, UrgentRefresh};
