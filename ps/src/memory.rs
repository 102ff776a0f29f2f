//! In-memory ProjectStore for tests and light embedding

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{DistroMapping, NewProject, Project, ProjectId, ProjectVersion, Run};
use crate::store::ProjectStore;

#[derive(Debug, Default)]
struct Inner {
    next_id: ProjectId,
    projects: HashMap<ProjectId, Project>,
    mappings: Vec<DistroMapping>,
    versions: Vec<ProjectVersion>,
    runs: Vec<Run>,
}

/// Mutex-guarded in-memory store with the same semantics as [`crate::SqliteStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}

fn by_name(projects: &mut [Project]) {
    projects.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then(a.id.cmp(&b.id))
    });
}

impl ProjectStore for MemoryStore {
    fn projects_due(&self, before: DateTime<Utc>) -> Result<Vec<Project>> {
        let inner = self.inner();
        let mut due: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| !p.archived && p.next_check < before)
            .cloned()
            .collect();
        by_name(&mut due);
        Ok(due)
    }

    fn get(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.inner().projects.get(&id).cloned())
    }

    fn create_project(&self, new: NewProject) -> Result<Project> {
        let mut inner = self.inner();
        inner.next_id += 1;
        let now = Utc::now();
        let project = Project {
            id: inner.next_id,
            name: new.name,
            backend: new.backend,
            next_check: new.next_check.unwrap_or(now),
            error_counter: 0,
            archived: false,
            created_on: now,
            updated_on: now,
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let inner = self.inner();
        let mut projects: Vec<Project> = inner.projects.values().cloned().collect();
        by_name(&mut projects);
        Ok(projects)
    }

    fn update_next_check(&self, id: ProjectId, when: DateTime<Utc>) -> Result<()> {
        if let Some(project) = self.inner().projects.get_mut(&id) {
            project.next_check = when;
            project.updated_on = Utc::now();
        }
        Ok(())
    }

    fn reset_error_counter(&self, id: ProjectId) -> Result<()> {
        if let Some(project) = self.inner().projects.get_mut(&id) {
            project.error_counter = 0;
            project.updated_on = Utc::now();
        }
        Ok(())
    }

    fn bump_error_counter(&self, id: ProjectId) -> Result<u32> {
        let mut inner = self.inner();
        match inner.projects.get_mut(&id) {
            Some(project) => {
                project.error_counter += 1;
                project.updated_on = Utc::now();
                Ok(project.error_counter)
            }
            None => Ok(0),
        }
    }

    fn delete(&self, id: ProjectId) -> Result<()> {
        let mut inner = self.inner();
        inner.projects.remove(&id);
        inner.mappings.retain(|m| m.project_id != id);
        inner.versions.retain(|v| v.project_id != id);
        Ok(())
    }

    fn add_mapping(&self, id: ProjectId, distro: &str, package_name: &str) -> Result<()> {
        self.inner().mappings.push(DistroMapping {
            project_id: id,
            distro: distro.to_string(),
            package_name: package_name.to_string(),
        });
        Ok(())
    }

    fn mapping_count(&self, id: ProjectId) -> Result<u32> {
        Ok(self
            .inner()
            .mappings
            .iter()
            .filter(|m| m.project_id == id)
            .count() as u32)
    }

    fn add_version(&self, id: ProjectId, version: &str) -> Result<()> {
        self.inner().versions.push(ProjectVersion {
            project_id: id,
            version: version.to_string(),
            created_on: Utc::now(),
        });
        Ok(())
    }

    fn version_count(&self, id: ProjectId) -> Result<u32> {
        Ok(self
            .inner()
            .versions
            .iter()
            .filter(|v| v.project_id == id)
            .count() as u32)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        self.inner().runs.push(*run);
        Ok(())
    }

    fn list_runs(&self, limit: u32) -> Result<Vec<Run>> {
        let inner = self.inner();
        Ok(inner.runs.iter().rev().take(limit as usize).copied().collect())
    }

    fn project_count(&self) -> Result<u32> {
        Ok(self.inner().projects.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_due_filtering_and_ordering() {
        let store = MemoryStore::new();
        let past = Utc::now() - Duration::hours(1);
        store
            .create_project(NewProject::new("Zsh", "GitHub").with_next_check(past))
            .unwrap();
        store
            .create_project(NewProject::new("attr", "GitHub").with_next_check(past))
            .unwrap();
        store
            .create_project(NewProject::new("notyet", "GitHub").with_next_check(Utc::now() + Duration::hours(1)))
            .unwrap();

        let due = store.projects_due(Utc::now()).unwrap();
        let names: Vec<&str> = due.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["attr", "Zsh"]);
    }

    #[test]
    fn test_counter_lifecycle() {
        let store = MemoryStore::new();
        let project = store.create_project(NewProject::new("curl", "GitHub")).unwrap();

        assert_eq!(store.bump_error_counter(project.id).unwrap(), 1);
        store.reset_error_counter(project.id).unwrap();
        assert_eq!(store.get(project.id).unwrap().unwrap().error_counter, 0);
    }

    #[test]
    fn test_delete_removes_dependents() {
        let store = MemoryStore::new();
        let project = store.create_project(NewProject::new("curl", "GitHub")).unwrap();
        store.add_mapping(project.id, "Fedora", "curl").unwrap();
        store.add_version(project.id, "8.5.0").unwrap();

        store.delete(project.id).unwrap();

        assert!(store.get(project.id).unwrap().is_none());
        assert_eq!(store.mapping_count(project.id).unwrap(), 0);
        assert_eq!(store.version_count(project.id).unwrap(), 0);
    }

    #[test]
    fn test_runs_newest_first() {
        let store = MemoryStore::new();
        for total in [1, 2, 3] {
            store
                .save_run(&Run {
                    created_on: Utc::now(),
                    total_count: total,
                    error_count: 0,
                    success_count: total,
                    ratelimit_count: 0,
                })
                .unwrap();
        }

        let runs = store.list_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].total_count, 3);
    }
}
