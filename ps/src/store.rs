//! ProjectStore trait and the SQLite-backed implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::Result;
use crate::model::{NewProject, Project, ProjectId, Run};

/// Storage contract consumed by the checker core and the CLI.
///
/// Implementations provide their own internal consistency; callers never
/// hold locks of their own across these calls. Mutations addressed to a
/// project id that no longer exists are no-ops: a checked project can be
/// deleted concurrently and the checker treats vanished projects as skips.
pub trait ProjectStore: Send + Sync {
    /// Projects with `next_check` before the given instant, excluding
    /// archived ones, ordered by case-insensitive name ascending
    fn projects_due(&self, before: DateTime<Utc>) -> Result<Vec<Project>>;

    fn get(&self, id: ProjectId) -> Result<Option<Project>>;

    fn create_project(&self, new: NewProject) -> Result<Project>;

    /// All projects, ordered by case-insensitive name ascending
    fn list_projects(&self) -> Result<Vec<Project>>;

    fn update_next_check(&self, id: ProjectId, when: DateTime<Utc>) -> Result<()>;

    /// Reset the consecutive-failure counter after a successful check
    fn reset_error_counter(&self, id: ProjectId) -> Result<()>;

    /// Increment the consecutive-failure counter, returning the new value
    fn bump_error_counter(&self, id: ProjectId) -> Result<u32>;

    /// Remove a project along with its mappings and recorded versions
    fn delete(&self, id: ProjectId) -> Result<()>;

    fn add_mapping(&self, id: ProjectId, distro: &str, package_name: &str) -> Result<()>;

    fn mapping_count(&self, id: ProjectId) -> Result<u32>;

    fn add_version(&self, id: ProjectId, version: &str) -> Result<()>;

    fn version_count(&self, id: ProjectId) -> Result<u32>;

    /// Persist a run summary record
    fn save_run(&self, run: &Run) -> Result<()>;

    /// Most recent run summaries, newest first
    fn list_runs(&self, limit: u32) -> Result<Vec<Run>>;

    fn project_count(&self) -> Result<u32>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    backend TEXT NOT NULL,
    next_check INTEGER NOT NULL,
    error_counter INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    created_on INTEGER NOT NULL,
    updated_on INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_projects_due ON projects (archived, next_check);
CREATE TABLE IF NOT EXISTS distro_mappings (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    distro TEXT NOT NULL,
    package_name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL REFERENCES projects (id) ON DELETE CASCADE,
    version TEXT NOT NULL,
    created_on INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY,
    created_on INTEGER NOT NULL,
    total_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL,
    ratelimit_count INTEGER NOT NULL
);
";

const PROJECT_COLUMNS: &str = "id, name, backend, next_check, error_counter, archived, created_on, updated_on";

/// Durable SQLite-backed store
///
/// Timestamps are persisted as Unix milliseconds.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path.as_ref())?)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        debug!("project store schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

fn to_millis(when: DateTime<Utc>) -> i64 {
    when.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        backend: row.get(2)?,
        next_check: from_millis(row.get(3)?),
        error_counter: row.get(4)?,
        archived: row.get(5)?,
        created_on: from_millis(row.get(6)?),
        updated_on: from_millis(row.get(7)?),
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        created_on: from_millis(row.get(0)?),
        total_count: row.get(1)?,
        error_count: row.get(2)?,
        success_count: row.get(3)?,
        ratelimit_count: row.get(4)?,
    })
}

impl ProjectStore for SqliteStore {
    fn projects_due(&self, before: DateTime<Utc>) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE archived = 0 AND next_check < ?1
             ORDER BY lower(name) ASC"
        ))?;
        let projects = stmt
            .query_map(params![to_millis(before)], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn get(&self, id: ProjectId) -> Result<Option<Project>> {
        let conn = self.conn();
        let project = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    fn create_project(&self, new: NewProject) -> Result<Project> {
        let now = Utc::now();
        let next_check = new.next_check.unwrap_or(now);
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (name, backend, next_check, error_counter, archived, created_on, updated_on)
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)",
            params![new.name, new.backend, to_millis(next_check), to_millis(now)],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, name = %new.name, backend = %new.backend, "created project");
        Ok(Project {
            id,
            name: new.name,
            backend: new.backend,
            next_check,
            error_counter: 0,
            archived: false,
            created_on: now,
            updated_on: now,
        })
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY lower(name) ASC"
        ))?;
        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn update_next_check(&self, id: ProjectId, when: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE projects SET next_check = ?2, updated_on = ?3 WHERE id = ?1",
            params![id, to_millis(when), to_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn reset_error_counter(&self, id: ProjectId) -> Result<()> {
        self.conn().execute(
            "UPDATE projects SET error_counter = 0, updated_on = ?2 WHERE id = ?1",
            params![id, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn bump_error_counter(&self, id: ProjectId) -> Result<u32> {
        let conn = self.conn();
        conn.execute(
            "UPDATE projects SET error_counter = error_counter + 1, updated_on = ?2 WHERE id = ?1",
            params![id, to_millis(Utc::now())],
        )?;
        let counter = conn
            .query_row(
                "SELECT error_counter FROM projects WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(counter.unwrap_or(0))
    }

    fn delete(&self, id: ProjectId) -> Result<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        if deleted > 0 {
            debug!(id, "deleted project");
        }
        Ok(())
    }

    fn add_mapping(&self, id: ProjectId, distro: &str, package_name: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO distro_mappings (project_id, distro, package_name) VALUES (?1, ?2, ?3)",
            params![id, distro, package_name],
        )?;
        Ok(())
    }

    fn mapping_count(&self, id: ProjectId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM distro_mappings WHERE project_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn add_version(&self, id: ProjectId, version: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO versions (project_id, version, created_on) VALUES (?1, ?2, ?3)",
            params![id, version, to_millis(Utc::now())],
        )?;
        Ok(())
    }

    fn version_count(&self, id: ProjectId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM versions WHERE project_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn save_run(&self, run: &Run) -> Result<()> {
        self.conn().execute(
            "INSERT INTO runs (created_on, total_count, error_count, success_count, ratelimit_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                to_millis(run.created_on),
                run.total_count,
                run.error_count,
                run.success_count,
                run.ratelimit_count
            ],
        )?;
        Ok(())
    }

    fn list_runs(&self, limit: u32) -> Result<Vec<Run>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT created_on, total_count, error_count, success_count, ratelimit_count
             FROM runs ORDER BY created_on DESC, id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn project_count(&self) -> Result<u32> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
        Ok(count)
    }
}
