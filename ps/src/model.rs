//! Data model owned by the project store
//!
//! The checker core only reads a project's scheduling fields and requests
//! mutations through the [`crate::ProjectStore`] trait; everything here is
//! created and maintained by external surfaces (CLI, embedding applications).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, stable identifier for a tracked project
pub type ProjectId = i64;

/// A tracked upstream software component with a backend adapter and a
/// next-check schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier, stable for the project's lifetime
    pub id: ProjectId,

    /// Display name; queue ordering is case-insensitive on this field
    pub name: String,

    /// Name of the backend adapter responsible for checking this project
    pub backend: String,

    /// The project is not eligible for checking before this instant
    pub next_check: DateTime<Utc>,

    /// Consecutive failed checks; reset to zero on success
    pub error_counter: u32,

    /// Archived projects are never enqueued
    pub archived: bool,

    /// Creation timestamp
    pub created_on: DateTime<Utc>,

    /// Last update timestamp
    pub updated_on: DateTime<Utc>,
}

/// Insert shape for a new project
#[derive(Debug, Clone)]
pub struct NewProject {
    /// Display name
    pub name: String,

    /// Backend adapter name
    pub backend: String,

    /// When the first check may happen; "now" when absent
    pub next_check: Option<DateTime<Utc>>,
}

impl NewProject {
    /// Create a new project insert shape checked as soon as possible
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            next_check: None,
        }
    }

    /// Schedule the first check explicitly
    pub fn with_next_check(mut self, when: DateTime<Utc>) -> Self {
        self.next_check = Some(when);
        self
    }
}

/// Mapping of a project onto a distribution's package name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistroMapping {
    pub project_id: ProjectId,
    pub distro: String,
    pub package_name: String,
}

/// An upstream version recorded for a project
///
/// Stored verbatim; comparison and ordering of version strings happens
/// outside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectVersion {
    pub project_id: ProjectId,
    pub version: String,
    pub created_on: DateTime<Utc>,
}

/// Summary of one checker run over a batch of due projects
///
/// `total_count` equals the queue length; the three outcome counters only
/// sum to it when no task timed out and no backend got blocked mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run start timestamp
    pub created_on: DateTime<Utc>,

    /// Number of projects queued for the run
    pub total_count: u32,

    /// Failed checks, including timed-out and crashed tasks
    pub error_count: u32,

    /// Successful checks
    pub success_count: u32,

    /// Checks absorbed by a backend-wide rate limit
    pub ratelimit_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_defaults() {
        let new = NewProject::new("curl", "GitHub");
        assert_eq!(new.name, "curl");
        assert_eq!(new.backend, "GitHub");
        assert!(new.next_check.is_none());
    }

    #[test]
    fn test_new_project_with_next_check() {
        let when = Utc::now();
        let new = NewProject::new("curl", "GitHub").with_next_check(when);
        assert_eq!(new.next_check, Some(when));
    }

    #[test]
    fn test_run_serde_roundtrip() {
        let run = Run {
            created_on: Utc::now(),
            total_count: 12,
            error_count: 2,
            success_count: 9,
            ratelimit_count: 1,
        };

        let json = serde_json::to_string(&run).unwrap();
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(run, back);
    }
}
