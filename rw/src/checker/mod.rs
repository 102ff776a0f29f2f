//! Checker / run scheduler core
//!
//! One run walks Preparing -> Dispatching -> Awaiting -> Finalizing: build
//! the ordered queue (deferred rate-limited work first, then freshly due
//! projects), fan out across a bounded worker pool, absorb per-project
//! failures into counters, and persist a run record.

mod core;
mod counters;
mod ratelimit;

pub use self::core::Checker;
pub use self::counters::RunCounters;
pub use self::ratelimit::RateLimitTracker;
