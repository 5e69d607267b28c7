//! SQLite-backed store
//!
//! Projects and revisions live in one SQLite database in WAL mode. A partial
//! unique index on `revisions(project_id) WHERE is_active = 1` makes a second
//! active revision unrepresentable. Replacing the active revision, the
//! repair pass and a commit of text plus project statistics each run in a
//! single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::{ContentError, Result};
use crate::project::{NewProject, Project, ProjectDirectory, ProjectEdit};
use crate::revision::{NewRevision, PrincipalId, ProjectId, Revision, RevisionId};
use crate::store::{RevisionStore, RevisionWrite};

const REVISION_COLUMNS: &str =
    "id,project_id,content,content_type,version,is_active,auto_saved,save_reason,created_at,updated_at";

const PROJECT_COLUMNS: &str = "id,owner,title,description,genre,status,is_private,word_count,\
     target_word_count,created_at,updated_at,last_edited_at";

fn open_db(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            genre TEXT,
            status TEXT NOT NULL DEFAULT 'draft',
            is_private INTEGER NOT NULL DEFAULT 1,
            word_count INTEGER NOT NULL DEFAULT 0,
            target_word_count INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            last_edited_at TEXT
        );
        CREATE TABLE IF NOT EXISTS revisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            content TEXT,
            content_type TEXT NOT NULL DEFAULT 'markdown',
            version INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            auto_saved INTEGER NOT NULL DEFAULT 0,
            save_reason TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT
        );
        CREATE INDEX IF NOT EXISTS revisions_project_version ON revisions(project_id, version);",
    )?;

    // Databases written before the single-active index existed may hold
    // duplicates; the index cannot be built until they are repaired.
    let duplicated: Vec<ProjectId> = {
        let mut stmt = conn.prepare(
            "SELECT project_id FROM revisions WHERE is_active=1 GROUP BY project_id HAVING COUNT(*)>1",
        )?;
        let ids = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };
    if !duplicated.is_empty() {
        let tx = conn.unchecked_transaction()?;
        for project in duplicated {
            warn!("Project {} has several active revisions, repairing", project);
            conn_repair(&tx, project)?;
        }
        tx.commit()?;
    }

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS revisions_single_active
            ON revisions(project_id) WHERE is_active = 1;",
    )?;
    Ok(())
}

fn parse_column<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = ContentError>,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_revision(row: &Row<'_>) -> rusqlite::Result<Revision> {
    Ok(Revision {
        id: RevisionId::new(row.get(0)?),
        project_id: row.get(1)?,
        content: row.get(2)?,
        content_type: parse_column(3, row.get(3)?)?,
        version: row.get(4)?,
        is_active: row.get(5)?,
        auto_saved: row.get(6)?,
        save_reason: parse_column(7, row.get(7)?)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        genre: row.get(4)?,
        status: row.get(5)?,
        is_private: row.get(6)?,
        word_count: row.get(7)?,
        target_word_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        last_edited_at: row.get(11)?,
    })
}

fn conn_get_revision(conn: &Connection, id: i64) -> Result<Revision> {
    let sql = format!("SELECT {} FROM revisions WHERE id=?1", REVISION_COLUMNS);
    Ok(conn.query_row(&sql, params![id], row_to_revision)?)
}

fn conn_insert_revision(conn: &Connection, draft: NewRevision, now: DateTime<Utc>) -> Result<Revision> {
    let inserted = conn.execute(
        "INSERT INTO revisions (project_id,content,content_type,version,is_active,auto_saved,save_reason,created_at) \
         VALUES (?1,?2,?3,?4,1,?5,?6,?7)",
        params![
            draft.project_id,
            draft.content,
            draft.content_type.as_str(),
            draft.version,
            draft.auto_saved,
            draft.save_reason.as_str(),
            now,
        ],
    );
    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            return Err(ContentError::ConcurrencyViolation { project: draft.project_id, active: 2 });
        }
        Err(e) => return Err(e.into()),
    }
    let id = RevisionId::new(conn.last_insert_rowid());
    Ok(draft.into_revision(id, now))
}

fn conn_update_revision(conn: &Connection, revision: &Revision, now: DateTime<Utc>) -> Result<Revision> {
    let changed = conn.execute(
        "UPDATE revisions SET content=?1,content_type=?2,auto_saved=?3,save_reason=?4,updated_at=?5 WHERE id=?6",
        params![
            revision.content,
            revision.content_type.as_str(),
            revision.auto_saved,
            revision.save_reason.as_str(),
            now,
            revision.id.get(),
        ],
    )?;
    if changed == 0 {
        return Err(ContentError::NoActiveRevision(revision.project_id));
    }
    conn_get_revision(conn, revision.id.get())
}

fn conn_supersede(conn: &Connection, successor: NewRevision, now: DateTime<Utc>) -> Result<Revision> {
    conn.execute(
        "UPDATE revisions SET is_active=0 WHERE project_id=?1 AND is_active=1",
        params![successor.project_id],
    )?;
    conn_insert_revision(conn, successor, now)
}

fn conn_repair(conn: &Connection, project: ProjectId) -> Result<Option<Revision>> {
    conn.execute("UPDATE revisions SET is_active=0 WHERE project_id=?1", params![project])?;
    let promoted: Option<i64> = conn
        .query_row(
            "SELECT id FROM revisions WHERE project_id=?1 ORDER BY version DESC, id DESC LIMIT 1",
            params![project],
            |r| r.get(0),
        )
        .optional()?;
    match promoted {
        Some(id) => {
            conn.execute("UPDATE revisions SET is_active=1 WHERE id=?1", params![id])?;
            Ok(Some(conn_get_revision(conn, id)?))
        }
        None => Ok(None),
    }
}

/// SQLite-backed revision and project store
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ContentError::StoreUnavailable(format!("{:?}: {}", parent, e)))?;
            }
        }
        let conn = Connection::open(path)?;
        open_db(&conn)?;
        Ok(Self { path: Some(path.to_path_buf()), conn: Mutex::new(conn) })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        open_db(&conn)?;
        Ok(Self { path: None, conn: Mutex::new(conn) })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ContentError::StoreUnavailable("connection mutex poisoned".into()))
    }
}

#[async_trait]
impl RevisionStore for SqliteStore {
    async fn find_active(&self, project: ProjectId) -> Result<Option<Revision>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM revisions WHERE project_id=?1 AND is_active=1 LIMIT 2",
            REVISION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let mut found = stmt
            .query_map(params![project], row_to_revision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if found.len() > 1 {
            return Err(ContentError::ConcurrencyViolation { project, active: found.len() });
        }
        Ok(found.pop())
    }

    async fn find_by_version(&self, project: ProjectId, version: u32) -> Result<Option<Revision>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM revisions WHERE project_id=?1 AND version=?2 ORDER BY id LIMIT 1",
            REVISION_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![project, version], row_to_revision)
            .optional()?)
    }

    async fn list_all(&self, project: ProjectId) -> Result<Vec<Revision>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM revisions WHERE project_id=?1 ORDER BY version DESC, id DESC",
            REVISION_COLUMNS
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let all = stmt
            .query_map(params![project], row_to_revision)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(all)
    }

    async fn create(&self, draft: NewRevision) -> Result<Revision> {
        let conn = self.conn()?;
        conn_insert_revision(&conn, draft, Utc::now())
    }

    async fn update(&self, revision: &Revision) -> Result<Revision> {
        let conn = self.conn()?;
        conn_update_revision(&conn, revision, Utc::now())
    }

    async fn max_version(&self, project: ProjectId) -> Result<u32> {
        let conn = self.conn()?;
        let max: Option<u32> = conn.query_row(
            "SELECT MAX(version) FROM revisions WHERE project_id=?1",
            params![project],
            |r| r.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    async fn supersede(&self, successor: NewRevision) -> Result<Revision> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let created = conn_supersede(&tx, successor, Utc::now())?;
        tx.commit()?;
        Ok(created)
    }

    async fn commit(&self, write: RevisionWrite, edit: ProjectEdit) -> Result<Revision> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let project = write.project_id();
        let saved = match write {
            RevisionWrite::Create(draft) => conn_insert_revision(&tx, draft, edit.at)?,
            RevisionWrite::Update(revision) => conn_update_revision(&tx, &revision, edit.at)?,
            RevisionWrite::Supersede(successor) => conn_supersede(&tx, successor, edit.at)?,
        };
        tx.execute(
            "UPDATE projects SET word_count=?1,last_edited_at=?2,updated_at=?2 WHERE id=?3",
            params![edit.word_count, edit.at, project],
        )?;
        tx.commit()?;
        Ok(saved)
    }

    async fn repair_active(&self, project: ProjectId) -> Result<Option<Revision>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let promoted = conn_repair(&tx, project)?;
        tx.commit()?;
        Ok(promoted)
    }

    async fn count_active(&self, project: ProjectId) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM revisions WHERE project_id=?1 AND is_active=1",
            params![project],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    async fn project_ids(&self) -> Result<Vec<ProjectId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT DISTINCT project_id FROM revisions ORDER BY project_id")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

#[async_trait]
impl ProjectDirectory for SqliteStore {
    async fn register(&self, project: NewProject) -> Result<Project> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (owner,title,description,genre,target_word_count,created_at) \
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                project.owner,
                project.title,
                project.description,
                project.genre,
                project.target_word_count,
                Utc::now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        let sql = format!("SELECT {} FROM projects WHERE id=?1", PROJECT_COLUMNS);
        Ok(conn.query_row(&sql, params![id], row_to_project)?)
    }

    async fn fetch_owned(&self, project: ProjectId, principal: PrincipalId) -> Result<Project> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM projects WHERE id=?1 AND owner=?2", PROJECT_COLUMNS);
        conn.query_row(&sql, params![project, principal], row_to_project)
            .optional()?
            .ok_or(ContentError::NotFoundOrForbidden(project))
    }

    async fn fetch(&self, project: ProjectId) -> Result<Option<Project>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM projects WHERE id=?1", PROJECT_COLUMNS);
        Ok(conn.query_row(&sql, params![project], row_to_project).optional()?)
    }
}
