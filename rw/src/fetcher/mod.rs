//! Release fetcher seam
//!
//! A fetcher owns the site-specific work of discovering a project's upstream
//! versions and recording them through the project store: on success it
//! resets the project's consecutive-failure counter, on plugin failure it
//! bumps the counter and advances the next-check time. The checker core never
//! touches those fields itself; it only reacts to the three-way outcome.
//!
//! Site adapters register with a [`FetcherRegistry`] keyed by backend name.

mod error;

pub use error::FetchError;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use projectstore::Project;

/// A pluggable release fetcher for one backend
#[async_trait]
pub trait ReleaseFetcher: Send + Sync {
    /// Check a project for new upstream releases
    async fn check_release(&self, project: &Project) -> Result<(), FetchError>;
}

/// Dispatches checks to the fetcher registered for the project's backend
///
/// Checking a project whose backend has no registered fetcher is a plugin
/// failure, so misconfigured projects surface in run counters and logs
/// instead of silently succeeding.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: HashMap<String, Arc<dyn ReleaseFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher under a backend name, replacing any previous one
    pub fn register(&mut self, backend: impl Into<String>, fetcher: Arc<dyn ReleaseFetcher>) {
        self.fetchers.insert(backend.into(), fetcher);
    }

    /// Fetcher registered for a backend, if any
    pub fn get(&self, backend: &str) -> Option<Arc<dyn ReleaseFetcher>> {
        self.fetchers.get(backend).cloned()
    }

    /// Registered backend names, sorted
    pub fn backends(&self) -> Vec<String> {
        let mut backends: Vec<String> = self.fetchers.keys().cloned().collect();
        backends.sort();
        backends
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}

#[async_trait]
impl ReleaseFetcher for FetcherRegistry {
    async fn check_release(&self, project: &Project) -> Result<(), FetchError> {
        match self.fetchers.get(&project.backend) {
            Some(fetcher) => fetcher.check_release(project).await,
            None => Err(FetchError::plugin(format!(
                "no fetcher registered for backend {:?}",
                project.backend
            ))),
        }
    }
}
