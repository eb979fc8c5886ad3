use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use jobboard_common::JobRecord;
use jobboard_common::models::DEFAULT_STATUS;
use jobboard_common::protocol::JobFields;
use rusqlite::{Connection, OptionalExtension, params};

use super::auth::{Session, UserProfile};

/// Async-safe handle to the job database.
///
/// Wraps `JobDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<JobDb>>,
}

impl DbHandle {
    pub fn new(db: JobDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&JobDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Startup and tests only.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, JobDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

/// SQLite record store. Every job query is scoped to an owner; a job that
/// belongs to someone else is indistinguishable from one that does not exist.
pub struct JobDb {
    conn: Connection,
}

impl JobDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    email TEXT,
                    given_name TEXT,
                    family_name TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    expires_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner TEXT NOT NULL,
                    title TEXT NOT NULL,
                    company TEXT NOT NULL,
                    description TEXT,
                    status TEXT NOT NULL DEFAULT 'applied',
                    position INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner);
                CREATE INDEX IF NOT EXISTS idx_jobs_owner_status ON jobs(owner, status);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Job CRUD ──────────────────────────────────────────────────────

    /// Insert a job at the end of its column.
    pub fn insert_job(&self, owner: &str, fields: &JobFields) -> Result<JobRecord> {
        let position = next_position(&self.conn, owner, &fields.status)?;
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO jobs (owner, title, company, description, status, position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    owner,
                    fields.title,
                    fields.company,
                    fields.description,
                    fields.status,
                    position,
                    now
                ],
            )
            .context("Failed to insert job")?;
        let id = self.conn.last_insert_rowid();
        self.get_job(owner, id)?.context("Job not found after insert")
    }

    /// All of an owner's jobs, in board order.
    pub fn list_jobs(&self, owner: &str) -> Result<Vec<JobRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner, title, company, description, status, position, created_at
                 FROM jobs WHERE owner = ?1 ORDER BY position, id",
            )
            .context("Failed to prepare list_jobs")?;
        let rows = stmt
            .query_map(params![owner], read_job)
            .context("Failed to query jobs")?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.context("Failed to read job row")?);
        }
        Ok(jobs)
    }

    pub fn get_job(&self, owner: &str, id: i64) -> Result<Option<JobRecord>> {
        self.conn
            .query_row(
                "SELECT id, owner, title, company, description, status, position, created_at
                 FROM jobs WHERE id = ?1 AND owner = ?2",
                params![id, owner],
                read_job,
            )
            .optional()
            .context("Failed to query job")
    }

    pub fn count_jobs(&self, owner: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE owner = ?1",
                params![owner],
                |row| row.get(0),
            )
            .context("Failed to count jobs")?;
        Ok(count as usize)
    }

    /// Move a job to `dest` at `dest_index` (end of column when `None`,
    /// clamped otherwise) and renumber the affected columns. Returns `None`
    /// when the owner has no such job.
    pub fn move_job(
        &self,
        owner: &str,
        id: i64,
        dest: &str,
        dest_index: Option<usize>,
    ) -> Result<Option<JobRecord>> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let source: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1 AND owner = ?2",
                params![id, owner],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up job for move")?;
        let Some(source) = source else {
            return Ok(None);
        };

        let mut dest_ids = column_ids(&tx, owner, dest)?;
        dest_ids.retain(|&j| j != id);
        let index = dest_index.map_or(dest_ids.len(), |i| i.min(dest_ids.len()));
        dest_ids.insert(index, id);

        tx.execute(
            "UPDATE jobs SET status = ?1, updated_at = ?2 WHERE id = ?3 AND owner = ?4",
            params![dest, Utc::now(), id, owner],
        )
        .context("Failed to move job")?;
        renumber(&tx, &dest_ids)?;

        let source_key = effective_key(&source);
        if source_key != dest {
            let source_ids = column_ids(&tx, owner, source_key)?;
            renumber(&tx, &source_ids)?;
        }

        tx.commit().context("Failed to commit job move")?;
        self.get_job(owner, id)
    }

    /// Overwrite every mutable field. A status change appends the job to the
    /// end of its new column. Returns `None` when the owner has no such job.
    pub fn update_job(&self, owner: &str, id: i64, fields: &JobFields) -> Result<Option<JobRecord>> {
        let Some(current) = self.get_job(owner, id)? else {
            return Ok(None);
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let status_changed = effective_key(&current.status) != fields.status;
        let position = if status_changed {
            next_position(&tx, owner, &fields.status)?
        } else {
            current.position
        };
        tx.execute(
            "UPDATE jobs SET title = ?1, company = ?2, description = ?3, status = ?4, position = ?5, updated_at = ?6
             WHERE id = ?7 AND owner = ?8",
            params![
                fields.title,
                fields.company,
                fields.description,
                fields.status,
                position,
                Utc::now(),
                id,
                owner
            ],
        )
        .context("Failed to update job")?;
        if status_changed {
            let source_ids = column_ids(&tx, owner, effective_key(&current.status))?;
            renumber(&tx, &source_ids)?;
        }
        tx.commit().context("Failed to commit job update")?;
        self.get_job(owner, id)
    }

    /// Hard delete. Returns whether a row was removed.
    pub fn delete_job(&self, owner: &str, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM jobs WHERE id = ?1 AND owner = ?2",
                params![id, owner],
            )
            .context("Failed to delete job")?;
        Ok(count > 0)
    }

    // ── Users & sessions ──────────────────────────────────────────────

    pub fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (id, email, given_name, family_name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET email = excluded.email,
                     given_name = excluded.given_name, family_name = excluded.family_name",
                params![user.id, user.email, user.given_name, user.family_name],
            )
            .context("Failed to upsert user")?;
        Ok(())
    }

    pub fn create_session(&self, user: &UserProfile, ttl: Duration) -> Result<Session> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + ttl;
        self.conn
            .execute(
                "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token, user.id, expires_at.timestamp()],
            )
            .context("Failed to insert session")?;
        Ok(Session {
            token,
            user: user.clone(),
            expires_at,
        })
    }

    /// Resolve a live session. Expired sessions resolve to `None`.
    pub fn find_session(&self, token: &str) -> Result<Option<Session>> {
        let row = self
            .conn
            .query_row(
                "SELECT s.token, s.expires_at, u.id, u.email, u.given_name, u.family_name
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        UserProfile {
                            id: row.get(2)?,
                            email: row.get(3)?,
                            given_name: row.get(4)?,
                            family_name: row.get(5)?,
                        },
                    ))
                },
            )
            .optional()
            .context("Failed to query session")?;

        let Some((token, expires_at, user)) = row else {
            return Ok(None);
        };
        let expires_at = DateTime::from_timestamp(expires_at, 0)
            .context("Session expiry out of range")?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }
        Ok(Some(Session {
            token,
            user,
            expires_at,
        }))
    }

    pub fn delete_session(&self, token: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to delete session")?;
        Ok(count > 0)
    }

    pub fn purge_expired_sessions(&self) -> Result<usize> {
        let count = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )
            .context("Failed to purge sessions")?;
        Ok(count)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).context("Raw statement failed")
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

fn read_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    Ok(JobRecord {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        company: row.get(3)?,
        description: row.get(4)?,
        status: row.get(5)?,
        position: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Column key a stored status lands in; blank statuses belong to the
/// default column.
fn effective_key(status: &str) -> &str {
    jobboard_common::board::effective_status(status)
}

/// Ids of one column in board order. Blank statuses count as the default
/// column, matching the projection.
fn column_ids(conn: &Connection, owner: &str, key: &str) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM jobs
             WHERE owner = ?1 AND (status = ?2 OR (?2 = ?3 AND TRIM(status) = ''))
             ORDER BY position, id",
        )
        .context("Failed to prepare column_ids")?;
    let rows = stmt
        .query_map(params![owner, key, DEFAULT_STATUS], |row| row.get(0))
        .context("Failed to query column ids")?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.context("Failed to read column id")?);
    }
    Ok(ids)
}

fn next_position(conn: &Connection, owner: &str, key: &str) -> Result<i64> {
    let max_pos: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(position), -1) FROM jobs
             WHERE owner = ?1 AND (status = ?2 OR (?2 = ?3 AND TRIM(status) = ''))",
            params![owner, key, DEFAULT_STATUS],
            |row| row.get(0),
        )
        .context("Failed to get max position")?;
    Ok(max_pos + 1)
}

fn renumber(conn: &Connection, ids: &[i64]) -> Result<()> {
    let mut stmt = conn
        .prepare("UPDATE jobs SET position = ?1 WHERE id = ?2")
        .context("Failed to prepare renumber")?;
    for (position, id) in ids.iter().enumerate() {
        stmt.execute(params![position as i64, id])
            .context("Failed to renumber job")?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────
