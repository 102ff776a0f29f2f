//! Checker implementation

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use projectstore::{ProjectId, ProjectStore, Run};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::counters::RunCounters;
use super::ratelimit::RateLimitTracker;
use crate::config::CheckerConfig;
use crate::fetcher::{FetchError, ReleaseFetcher};

/// Orchestrates check runs over the projects that are due
///
/// The checker owns a [`RateLimitTracker`] for the life of the process, so
/// work deferred behind a backend block in one run is replayed by a later
/// one. Everything else about a run is run-scoped.
pub struct Checker {
    config: CheckerConfig,
    store: Arc<dyn ProjectStore>,
    fetcher: Arc<dyn ReleaseFetcher>,
    ratelimits: Arc<RateLimitTracker>,
}

impl Checker {
    pub fn new(
        config: CheckerConfig,
        store: Arc<dyn ProjectStore>,
        fetcher: Arc<dyn ReleaseFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            ratelimits: Arc::new(RateLimitTracker::new()),
        }
    }

    /// Rate-limit state carried across runs
    pub fn rate_limits(&self) -> &RateLimitTracker {
        &self.ratelimits
    }

    /// Execute one run over everything currently due
    ///
    /// Returns `None` when nothing was due; no run record is written in that
    /// case. Per-project failures of any kind are absorbed into the run's
    /// counters. The only errors surfaced to the caller are store failures
    /// while preparing the queue or persisting the run record.
    pub async fn run(&self) -> Result<Option<Run>> {
        let started_at = Utc::now();
        let queue = self
            .build_queue(started_at)
            .context("failed to build check queue")?;
        if queue.is_empty() {
            debug!("no projects due, skipping run");
            return Ok(None);
        }

        let total = queue.len() as u32;
        info!(total, pool_size = self.config.pool_size, "starting check run");

        let counters = Arc::new(RunCounters::new());
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let mut tasks: JoinSet<()> = JoinSet::new();

        for project_id in queue {
            let semaphore = semaphore.clone();
            let store = self.store.clone();
            let fetcher = self.fetcher.clone();
            let ratelimits = self.ratelimits.clone();
            let counters = counters.clone();
            let error_threshold = self.config.error_threshold;

            tasks.spawn(async move {
                // The semaphore is never closed, so this only fails if the
                // runtime is tearing down.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                check_project(
                    store.as_ref(),
                    fetcher.as_ref(),
                    &ratelimits,
                    &counters,
                    error_threshold,
                    project_id,
                )
                .await;
            });
        }

        let deadline = Duration::from_secs(self.config.run_timeout_seconds);
        let all_done = tokio::time::timeout(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(err) = joined {
                    counters.record_error();
                    warn!(%err, "check task aborted unexpectedly");
                }
            }
        })
        .await
        .is_ok();

        if !all_done {
            let outstanding = tasks.len() as u32;
            warn!(
                outstanding,
                timeout_secs = self.config.run_timeout_seconds,
                "run timed out, counting outstanding checks as errors"
            );
            for _ in 0..outstanding {
                counters.record_error();
            }
            // Survivors keep running in the background; their outcome is no
            // longer observed by this run.
            tasks.detach_all();
        }

        let run = Run {
            created_on: started_at,
            total_count: total,
            error_count: counters.errors(),
            success_count: counters.successes(),
            ratelimit_count: counters.ratelimited(),
        };
        self.store
            .save_run(&run)
            .context("failed to persist run record")?;
        info!(
            total = run.total_count,
            success = run.success_count,
            error = run.error_count,
            ratelimited = run.ratelimit_count,
            "check run finished"
        );
        Ok(Some(run))
    }

    /// Build the ordered, deduplicated queue for one run
    ///
    /// Work released from expired backend blocks goes first, in original
    /// deferral order, so backlog cannot grow unbounded under sustained
    /// limiting; freshly due projects follow in case-insensitive name order.
    /// Duplicates keep their first occurrence.
    fn build_queue(&self, now: DateTime<Utc>) -> projectstore::Result<Vec<ProjectId>> {
        let mut queue = self.ratelimits.drain(now);
        let due = self.store.projects_due(now)?;
        queue.extend(due.iter().map(|project| project.id));

        let mut seen = HashSet::new();
        queue.retain(|id| seen.insert(*id));
        Ok(queue)
    }
}

/// Run the per-project check state machine
///
/// Never lets an error escape: store failures, plugin failures, and rate
/// limits all end up in the counters or the rate-limit tracker.
async fn check_project(
    store: &dyn ProjectStore,
    fetcher: &dyn ReleaseFetcher,
    ratelimits: &RateLimitTracker,
    counters: &RunCounters,
    error_threshold: u32,
    project_id: ProjectId,
) {
    let project = match store.get(project_id) {
        Ok(Some(project)) => project,
        Ok(None) => {
            debug!(project_id, "project vanished before check, skipping");
            return;
        }
        Err(err) => {
            counters.record_error();
            warn!(project_id, %err, "failed to load project");
            return;
        }
    };

    // The blacklist may have grown since the queue was built; re-check at
    // dispatch time. A deferral here counts as neither success, error, nor
    // rate limit -- the block was already accounted when first discovered.
    if let Some(reset_time) = ratelimits.blacklisted_until(&project.backend) {
        debug!(
            project = %project.name,
            backend = %project.backend,
            %reset_time,
            "backend blocked, pushing next check past the reset"
        );
        if let Err(err) = store.update_next_check(project.id, reset_time) {
            warn!(project = %project.name, %err, "failed to reschedule blocked project");
        }
        return;
    }

    match fetcher.check_release(&project).await {
        Ok(()) => {
            counters.record_success();
            debug!(project = %project.name, backend = %project.backend, "check succeeded");
        }
        Err(FetchError::RateLimited { reset_time }) => {
            ratelimits.blacklist(&project, reset_time);
            counters.record_ratelimited();
            warn!(
                backend = %project.backend,
                %reset_time,
                "backend rate limited, deferring its remaining projects"
            );
        }
        Err(FetchError::Plugin { message }) => {
            counters.record_error();
            warn!(
                project = %project.name,
                backend = %project.backend,
                %message,
                "release check failed"
            );
            if let Err(err) = delete_if_worthless(store, project_id, error_threshold) {
                warn!(project_id, %err, "delete-candidacy check failed");
            }
        }
    }
}

/// Drop a project whose repeated failures carry no recorded value
///
/// A project is a delete candidate when its consecutive-failure counter has
/// reached the threshold and it has either no distro mapping at all, or a
/// mapping but zero recorded versions. The project is re-read so the counter
/// bumped by the fetcher a moment ago is observed.
fn delete_if_worthless(
    store: &dyn ProjectStore,
    project_id: ProjectId,
    error_threshold: u32,
) -> projectstore::Result<()> {
    let Some(project) = store.get(project_id)? else {
        return Ok(());
    };
    if project.error_counter < error_threshold {
        return Ok(());
    }
    let worthless = store.mapping_count(project_id)? == 0 || store.version_count(project_id)? == 0;
    if worthless {
        info!(
            project = %project.name,
            failures = project.error_counter,
            "deleting project with no recorded value after repeated failures"
        );
        store.delete(project_id)?;
    }
    Ok(())
}
