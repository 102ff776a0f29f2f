//! Per-backend rate-limit tracking
//!
//! A backend rate limit is discovered lazily, as a side effect of checking
//! one of its projects. Once discovered, every remaining project for that
//! backend is deferred instead of attempted, and replayed ahead of freshly
//! due work once the limit expires.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use projectstore::{Project, ProjectId};
use tracing::debug;

/// Tracks which backends are blocked and the work deferred because of it
///
/// Lives for the process lifetime so deferred work survives across runs; it
/// is never persisted. Lock order is `blacklist` before `pending`, and
/// neither lock is held across a store or fetcher call.
///
/// Invariant: a backend has a `pending` entry iff that entry is non-empty; a
/// backend present in `blacklist` must not be queried until its reset time.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    blacklist: Mutex<HashMap<String, DateTime<Utc>>>,
    pending: Mutex<HashMap<String, Vec<ProjectId>>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the project's backend until `reset_time` and defer the project
    ///
    /// The first reset time reported for a backend wins; the project id is
    /// unconditionally appended to the backend's pending queue. The caller
    /// accounts the deferral in the run's rate-limit counter.
    pub fn blacklist(&self, project: &Project, reset_time: DateTime<Utc>) {
        {
            let mut blacklist = self.blacklist.lock().unwrap();
            blacklist.entry(project.backend.clone()).or_insert(reset_time);
        }
        let mut pending = self.pending.lock().unwrap();
        pending
            .entry(project.backend.clone())
            .or_default()
            .push(project.id);
        debug!(
            backend = %project.backend,
            project_id = project.id,
            %reset_time,
            "deferred project behind rate limit"
        );
    }

    /// Reset instant for a blocked backend, if any
    pub fn blacklisted_until(&self, backend: &str) -> Option<DateTime<Utc>> {
        self.blacklist.lock().unwrap().get(backend).copied()
    }

    /// Release every backend whose reset time has passed
    ///
    /// Returns the deferred project ids, each backend's queue in its original
    /// order (inter-backend order is unspecified). Backends still within
    /// their reset window keep both their block and their pending queue.
    pub fn drain(&self, now: DateTime<Utc>) -> Vec<ProjectId> {
        let mut blacklist = self.blacklist.lock().unwrap();
        let mut pending = self.pending.lock().unwrap();

        let expired: Vec<String> = blacklist
            .iter()
            .filter(|(_, reset)| **reset < now)
            .map(|(backend, _)| backend.clone())
            .collect();

        let mut released = Vec::new();
        for backend in expired {
            blacklist.remove(&backend);
            if let Some(ids) = pending.remove(&backend) {
                debug!(backend = %backend, count = ids.len(), "rate limit expired, releasing deferred projects");
                released.extend(ids);
            }
        }
        released
    }

    /// Deferred project ids for one backend, in original order
    pub fn pending_for(&self, backend: &str) -> Vec<ProjectId> {
        self.pending
            .lock()
            .unwrap()
            .get(backend)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of projects currently deferred across all backends
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn project(id: ProjectId, backend: &str) -> Project {
        let now = Utc::now();
        Project {
            id,
            name: format!("project-{id}"),
            backend: backend.to_string(),
            next_check: now,
            error_counter: 0,
            archived: false,
            created_on: now,
            updated_on: now,
        }
    }

    #[test]
    fn test_first_reset_time_wins() {
        let tracker = RateLimitTracker::new();
        let first = Utc::now() + Duration::hours(1);
        let second = Utc::now() + Duration::hours(5);

        tracker.blacklist(&project(1, "GitHub"), first);
        tracker.blacklist(&project(2, "GitHub"), second);

        assert_eq!(tracker.blacklisted_until("GitHub"), Some(first));
        assert_eq!(tracker.pending_for("GitHub"), vec![1, 2]);
    }

    #[test]
    fn test_blacklisted_until_unknown_backend() {
        let tracker = RateLimitTracker::new();
        assert_eq!(tracker.blacklisted_until("GitHub"), None);
    }

    #[test]
    fn test_drain_releases_expired_backend_in_order() {
        let tracker = RateLimitTracker::new();
        let reset = Utc::now() - Duration::minutes(1);
        tracker.blacklist(&project(7, "GitHub"), reset);
        tracker.blacklist(&project(3, "GitHub"), reset);

        let released = tracker.drain(Utc::now());

        assert_eq!(released, vec![7, 3]);
        assert_eq!(tracker.blacklisted_until("GitHub"), None);
        assert!(tracker.pending_for("GitHub").is_empty());
    }

    #[test]
    fn test_drain_keeps_unexpired_backend() {
        let tracker = RateLimitTracker::new();
        let reset = Utc::now() + Duration::hours(1);
        tracker.blacklist(&project(1, "GitHub"), reset);

        let released = tracker.drain(Utc::now());

        assert!(released.is_empty());
        assert_eq!(tracker.blacklisted_until("GitHub"), Some(reset));
        assert_eq!(tracker.pending_for("GitHub"), vec![1]);
    }

    #[test]
    fn test_drain_is_idempotent() {
        let tracker = RateLimitTracker::new();
        let reset = Utc::now() - Duration::minutes(1);
        tracker.blacklist(&project(1, "GitHub"), reset);

        let first = tracker.drain(Utc::now());
        let second = tracker.drain(Utc::now());

        assert_eq!(first, vec![1]);
        assert!(second.is_empty());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_drain_releases_only_expired_backends() {
        let tracker = RateLimitTracker::new();
        tracker.blacklist(&project(1, "GitHub"), Utc::now() - Duration::minutes(1));
        tracker.blacklist(&project(2, "PyPI"), Utc::now() + Duration::hours(1));

        let released = tracker.drain(Utc::now());

        assert_eq!(released, vec![1]);
        assert_eq!(tracker.pending_for("PyPI"), vec![2]);
        assert!(tracker.blacklisted_until("PyPI").is_some());
    }
}
