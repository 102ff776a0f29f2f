//! RelWatch - upstream release monitoring daemon
//!
//! RelWatch periodically re-checks a large collection of tracked software
//! projects for newly published release versions. Per-site backends are thin
//! adapters behind a trait; the interesting part is the checker core, which
//! decides what is due on every run, fans the work out across a bounded pool,
//! absorbs backend-wide rate limits without losing work, and records the
//! outcome durably.
//!
//! # Core Concepts
//!
//! - **Lazy rate-limit discovery**: a backend block is found by tripping it
//!   once; every other project on that backend is deferred, not attempted
//! - **Deferred work is replayed first**: once a block expires, its pending
//!   projects jump ahead of freshly due ones so backlog cannot grow unbounded
//! - **No failure aborts a run**: plugin errors, panics, and timeouts all
//!   fold into the run's counters
//!
//! # Modules
//!
//! - [`checker`] - Run scheduler, rate-limit tracker, and run counters
//! - [`fetcher`] - Release fetcher trait, error taxonomy, and backend registry
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`daemon`] - Background process lifecycle

pub mod checker;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod fetcher;

// Re-export commonly used types
pub use checker::{Checker, RateLimitTracker, RunCounters};
pub use config::{CheckerConfig, Config, StorageConfig};
pub use daemon::{DaemonManager, DaemonStatus};
pub use fetcher::{FetchError, FetcherRegistry, ReleaseFetcher};
