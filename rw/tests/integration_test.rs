//! Integration tests for RelWatch
//!
//! These tests drive the checker end-to-end against the real SQLite-backed
//! project store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use projectstore::{NewProject, Project, ProjectStore, SqliteStore};
use relwatch::checker::Checker;
use relwatch::config::CheckerConfig;
use relwatch::fetcher::{FetchError, ReleaseFetcher};

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    RateLimit(DateTime<Utc>),
}

/// Fetcher scripted per backend, doing the fetcher-side bookkeeping a real
/// adapter does: reset the error counter and push out the next check on
/// success, bump the counter on failure.
struct ScriptedFetcher {
    store: Arc<SqliteStore>,
    behaviors: Mutex<HashMap<String, Behavior>>,
}

impl ScriptedFetcher {
    fn new(store: Arc<SqliteStore>) -> Self {
        Self {
            store,
            behaviors: Mutex::new(HashMap::new()),
        }
    }

    fn script(&self, backend: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(backend.to_string(), behavior);
    }
}

#[async_trait]
impl ReleaseFetcher for ScriptedFetcher {
    async fn check_release(&self, project: &Project) -> Result<(), FetchError> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&project.backend)
            .copied()
            .unwrap_or(Behavior::Succeed);
        match behavior {
            Behavior::Succeed => {
                let _ = self.store.reset_error_counter(project.id);
                let _ = self
                    .store
                    .update_next_check(project.id, Utc::now() + Duration::hours(6));
                Ok(())
            }
            Behavior::Fail => {
                let _ = self.store.bump_error_counter(project.id);
                Err(FetchError::plugin("simulated failure"))
            }
            Behavior::RateLimit(reset_time) => Err(FetchError::rate_limited(reset_time)),
        }
    }
}

struct Harness {
    store: Arc<SqliteStore>,
    fetcher: Arc<ScriptedFetcher>,
    checker: Checker,
}

fn harness(pool_size: usize, error_threshold: u32) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().expect("Failed to open in-memory store"));
    let fetcher = Arc::new(ScriptedFetcher::new(store.clone()));
    let config = CheckerConfig {
        pool_size,
        run_interval_seconds: 300,
        run_timeout_seconds: 60,
        error_threshold,
    };
    let checker = Checker::new(config, store.clone(), fetcher.clone());
    Harness {
        store,
        fetcher,
        checker,
    }
}

fn seed_due(store: &SqliteStore, name: &str, backend: &str) -> Project {
    store
        .create_project(NewProject::new(name, backend).with_next_check(Utc::now() - Duration::hours(1)))
        .expect("Failed to seed project")
}

#[tokio::test]
async fn test_successful_run_persists_a_run_record() {
    let h = harness(4, 100);
    seed_due(&h.store, "curl", "GitHub");
    seed_due(&h.store, "zlib", "GitHub");

    let run = h.checker.run().await.unwrap().expect("run should happen");

    assert_eq!(run.total_count, 2);
    assert_eq!(run.success_count, 2);
    assert_eq!(run.error_count, 0);
    assert_eq!(run.ratelimit_count, 0);

    let stored = h.store.list_runs(10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].total_count, 2);
    assert_eq!(stored[0].success_count, 2);

    // Successful checks push next_check forward, so nothing is due anymore.
    assert!(h.checker.run().await.unwrap().is_none());
    assert_eq!(h.store.list_runs(10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_store_writes_nothing() {
    let h = harness(4, 100);

    assert!(h.checker.run().await.unwrap().is_none());
    assert!(h.store.list_runs(10).unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limited_backend_blocks_and_replays_across_runs() {
    let h = harness(1, 100);
    let github = seed_due(&h.store, "curl", "GitHub");
    let pypi = seed_due(&h.store, "requests", "PyPI");

    // GitHub trips its rate limit; the reset is already behind us so the
    // next run can drain it.
    h.fetcher
        .script("GitHub", Behavior::RateLimit(Utc::now() - Duration::seconds(1)));

    let first = h.checker.run().await.unwrap().unwrap();
    assert_eq!(first.total_count, 2);
    assert_eq!(first.ratelimit_count, 1);
    assert_eq!(first.success_count, 1);
    assert_eq!(first.error_count, 0);
    assert_eq!(h.checker.rate_limits().pending_for("GitHub"), vec![github.id]);
    assert!(h.checker.rate_limits().blacklisted_until("GitHub").is_some());

    // The backend recovered; the deferred project is replayed first.
    h.fetcher.script("GitHub", Behavior::Succeed);
    let second = h.checker.run().await.unwrap().unwrap();

    assert_eq!(second.total_count, 1);
    assert_eq!(second.success_count, 1);
    assert!(h.checker.rate_limits().blacklisted_until("GitHub").is_none());
    assert!(h.checker.rate_limits().pending_for("GitHub").is_empty());

    // The PyPI project succeeded in run one and is no longer due.
    let requests = h.store.get(pypi.id).unwrap().unwrap();
    assert!(requests.next_check > Utc::now());
}

#[tokio::test]
async fn test_failing_project_is_retried_then_deleted_at_threshold() {
    let h = harness(2, 3);
    let project = seed_due(&h.store, "flaky", "Dead");
    h.fetcher.script("Dead", Behavior::Fail);

    for expected_counter in 1..=2u32 {
        let run = h.checker.run().await.unwrap().unwrap();
        assert_eq!(run.error_count, 1);
        let fetched = h.store.get(project.id).unwrap().unwrap();
        assert_eq!(fetched.error_counter, expected_counter);
    }

    // Third failure reaches the threshold; no mapping, so it is removed.
    let run = h.checker.run().await.unwrap().unwrap();
    assert_eq!(run.error_count, 1);
    assert!(h.store.get(project.id).unwrap().is_none());

    // And it never comes back.
    assert!(h.checker.run().await.unwrap().is_none());
}

#[tokio::test]
async fn test_project_with_recorded_versions_is_never_deleted() {
    let h = harness(2, 2);
    let project = seed_due(&h.store, "valued", "Dead");
    h.store.add_mapping(project.id, "Fedora", "valued").unwrap();
    h.store.add_version(project.id, "2.1.0").unwrap();
    h.fetcher.script("Dead", Behavior::Fail);

    for _ in 0..3 {
        h.checker.run().await.unwrap().unwrap();
    }

    let kept = h.store.get(project.id).unwrap().unwrap();
    assert_eq!(kept.error_counter, 3);
}

#[tokio::test]
async fn test_mixed_outcomes_accumulate_into_one_record() {
    let h = harness(4, 100);
    seed_due(&h.store, "alpha", "GitHub");
    seed_due(&h.store, "beta", "GitHub");
    seed_due(&h.store, "gamma", "Flaky");
    h.fetcher.script("Flaky", Behavior::Fail);

    let run = h.checker.run().await.unwrap().unwrap();

    assert_eq!(run.total_count, 3);
    assert_eq!(run.success_count, 2);
    assert_eq!(run.error_count, 1);
    assert_eq!(
        run.total_count,
        run.success_count + run.error_count + run.ratelimit_count
    );
}
