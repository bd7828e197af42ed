//! Retry job storage.
//!
//! SQLite is the durable backend. The in-memory backend exists only as a
//! fallback when the queue database cannot be opened, and for tests.

use super::models::{JobPriority, JobStatus, QueueStats, RetryJob};
use super::schema::RETRY_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub trait RetryQueueStore: Send + Sync {
    /// Schedule a redelivery. A second enqueue while a pending job for the
    /// notification exists replaces it (fresh priority, due time and attempt
    /// count) instead of adding a duplicate. Returns false only when the
    /// notification's job is currently in flight, which leaves the running
    /// attempt alone.
    fn enqueue(
        &self,
        notification_id: i64,
        seller_id: &str,
        priority: JobPriority,
        next_retry_at: i64,
    ) -> Result<bool>;

    /// Atomically claim due pending jobs, high priority first, then oldest
    /// due. Claimed jobs move to in-flight and are returned with their new
    /// status.
    fn claim_due(&self, now: i64, limit: usize) -> Result<Vec<RetryJob>>;

    /// Redelivery succeeded.
    fn mark_done(&self, id: i64) -> Result<()>;

    /// Attempt failed, schedule the next one.
    fn mark_retry(&self, id: i64, retry_count: i32, next_retry_at: i64, error: &str) -> Result<()>;

    /// Retries exhausted, terminal.
    fn mark_failed(&self, id: i64, retry_count: i32, error: &str) -> Result<()>;

    fn get_job(&self, id: i64) -> Result<Option<RetryJob>>;

    /// The active job for a notification, if any.
    fn get_active_for_notification(&self, notification_id: i64) -> Result<Option<RetryJob>>;

    fn stats(&self) -> Result<QueueStats>;

    /// Move in-flight jobs back to pending. Called once at startup so jobs
    /// claimed by a crashed process are picked up again.
    fn reset_in_flight(&self) -> Result<usize>;

    /// Delete terminal jobs older than `max_age_secs`. Returns rows deleted.
    fn purge_finished_older_than(&self, max_age_secs: i64) -> Result<usize>;
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Clone)]
pub struct SqliteRetryQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRetryQueueStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            RETRY_QUEUE_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created retry queue database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!("Retry queue database is missing its base version");
        }
        let version = db_version as usize;
        if version >= RETRY_QUEUE_VERSIONED_SCHEMAS.len() {
            bail!("Retry queue database version {} is too new", version);
        }

        RETRY_QUEUE_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteRetryQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        RETRY_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteRetryQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest = version;
        for schema in RETRY_QUEUE_VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating retry queue db from version {} to {}",
                    latest, schema.version
                );
                migration_fn(conn)?;
                latest = schema.version;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<RetryJob> {
        let status_str: String = row.get("status")?;
        Ok(RetryJob {
            id: row.get("id")?,
            notification_id: row.get("notification_id")?,
            seller_id: row.get("seller_id")?,
            priority: JobPriority::from_i64(row.get("priority")?),
            status: JobStatus::from_str(&status_str).unwrap_or(JobStatus::Failed),
            retry_count: row.get("retry_count")?,
            next_retry_at: row.get("next_retry_at")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl RetryQueueStore for SqliteRetryQueueStore {
    fn enqueue(
        &self,
        notification_id: i64,
        seller_id: &str,
        priority: JobPriority,
        next_retry_at: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let ts = now();
        // The connection mutex makes the existence check and write atomic.
        let active: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, status FROM retry_job \
                 WHERE notification_id = ?1 AND status IN ('PENDING', 'IN_FLIGHT')",
                params![notification_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match active {
            Some((_, status)) if status == JobStatus::InFlight.as_str() => Ok(false),
            Some((id, _)) => {
                conn.execute(
                    "UPDATE retry_job SET priority = ?2, next_retry_at = ?3, \
                     retry_count = 0, last_error = NULL, updated_at = ?4 WHERE id = ?1",
                    params![id, priority.as_i64(), next_retry_at, ts],
                )?;
                Ok(true)
            }
            None => {
                conn.execute(
                    "INSERT INTO retry_job \
                     (notification_id, seller_id, priority, status, next_retry_at, \
                      created_at, updated_at) \
                     VALUES (?1, ?2, ?3, 'PENDING', ?4, ?5, ?5)",
                    params![notification_id, seller_id, priority.as_i64(), next_retry_at, ts],
                )
                .with_context(|| {
                    format!("Failed to enqueue retry for notification {}", notification_id)
                })?;
                Ok(true)
            }
        }
    }

    fn claim_due(&self, now: i64, limit: usize) -> Result<Vec<RetryJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM retry_job \
             WHERE status = 'PENDING' AND next_retry_at <= ?1 \
             ORDER BY priority DESC, next_retry_at ASC LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![now, limit as i64], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;

        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            let changed = conn.execute(
                "UPDATE retry_job SET status = 'IN_FLIGHT', updated_at = ?2 \
                 WHERE id = ?1 AND status = 'PENDING'",
                params![id, now],
            )?;
            if changed == 1 {
                let mut stmt = conn.prepare("SELECT * FROM retry_job WHERE id = ?1")?;
                if let Some(job) = stmt.query_row([id], Self::row_to_job).optional()? {
                    claimed.push(job);
                }
            }
        }
        Ok(claimed)
    }

    fn mark_done(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE retry_job SET status = 'DONE', updated_at = ?2 WHERE id = ?1",
            params![id, now()],
        )?;
        Ok(())
    }

    fn mark_retry(&self, id: i64, retry_count: i32, next_retry_at: i64, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE retry_job SET status = 'PENDING', retry_count = ?2, \
             next_retry_at = ?3, last_error = ?4, updated_at = ?5 WHERE id = ?1",
            params![id, retry_count, next_retry_at, error, now()],
        )?;
        Ok(())
    }

    fn mark_failed(&self, id: i64, retry_count: i32, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE retry_job SET status = 'FAILED', retry_count = ?2, \
             last_error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, retry_count, error, now()],
        )?;
        Ok(())
    }

    fn get_job(&self, id: i64) -> Result<Option<RetryJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM retry_job WHERE id = ?1")?;
        Ok(stmt.query_row([id], Self::row_to_job).optional()?)
    }

    fn get_active_for_notification(&self, notification_id: i64) -> Result<Option<RetryJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM retry_job \
             WHERE notification_id = ?1 AND status IN ('PENDING', 'IN_FLIGHT')",
        )?;
        Ok(stmt
            .query_row([notification_id], Self::row_to_job)
            .optional()?)
    }

    fn stats(&self) -> Result<QueueStats> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM retry_job GROUP BY status")?;
        let mut stats = QueueStats::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (status, count) = row?;
            match JobStatus::from_str(&status) {
                Some(JobStatus::Pending) => stats.pending = count,
                Some(JobStatus::InFlight) => stats.in_flight = count,
                Some(JobStatus::Done) => stats.done = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => {}
            }
        }
        Ok(stats)
    }

    fn reset_in_flight(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let reset = conn.execute(
            "UPDATE retry_job SET status = 'PENDING', updated_at = ?1 \
             WHERE status = 'IN_FLIGHT'",
            params![now()],
        )?;
        Ok(reset)
    }

    fn purge_finished_older_than(&self, max_age_secs: i64) -> Result<usize> {
        let cutoff = now() - max_age_secs;
        let conn = self.conn.lock().unwrap();
        let purged = conn.execute(
            "DELETE FROM retry_job \
             WHERE status IN ('DONE', 'FAILED') AND updated_at < ?1",
            params![cutoff],
        )?;
        Ok(purged)
    }
}

/// Volatile fallback used when the queue database cannot be opened. Jobs do
/// not survive a restart.
#[derive(Default)]
pub struct InMemoryRetryQueueStore {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    next_id: i64,
    jobs: Vec<RetryJob>,
}

impl InMemoryRetryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RetryQueueStore for InMemoryRetryQueueStore {
    fn enqueue(
        &self,
        notification_id: i64,
        seller_id: &str,
        priority: JobPriority,
        next_retry_at: i64,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let ts = now();
        if let Some(job) = state
            .jobs
            .iter_mut()
            .find(|j| j.notification_id == notification_id && j.status.is_active())
        {
            if job.status == JobStatus::InFlight {
                return Ok(false);
            }
            job.priority = priority;
            job.next_retry_at = next_retry_at;
            job.retry_count = 0;
            job.last_error = None;
            job.updated_at = ts;
            return Ok(true);
        }
        state.next_id += 1;
        let job = RetryJob {
            id: state.next_id,
            notification_id,
            seller_id: seller_id.to_string(),
            priority,
            status: JobStatus::Pending,
            retry_count: 0,
            next_retry_at,
            last_error: None,
            created_at: ts,
            updated_at: ts,
        };
        state.jobs.push(job);
        Ok(true)
    }

    fn claim_due(&self, now: i64, limit: usize) -> Result<Vec<RetryJob>> {
        let mut state = self.state.lock().unwrap();
        let mut due: Vec<usize> = state
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.status == JobStatus::Pending && j.next_retry_at <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| {
            let job = &state.jobs[i];
            (std::cmp::Reverse(job.priority.as_i64()), job.next_retry_at)
        });
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for i in due {
            let job = &mut state.jobs[i];
            job.status = JobStatus::InFlight;
            job.updated_at = now;
            claimed.push(job.clone());
        }
        Ok(claimed)
    }

    fn mark_done(&self, id: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Done;
            job.updated_at = now();
        }
        Ok(())
    }

    fn mark_retry(&self, id: i64, retry_count: i32, next_retry_at: i64, error: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Pending;
            job.retry_count = retry_count;
            job.next_retry_at = next_retry_at;
            job.last_error = Some(error.to_string());
            job.updated_at = now();
        }
        Ok(())
    }

    fn mark_failed(&self, id: i64, retry_count: i32, error: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.iter_mut().find(|j| j.id == id) {
            job.status = JobStatus::Failed;
            job.retry_count = retry_count;
            job.last_error = Some(error.to_string());
            job.updated_at = now();
        }
        Ok(())
    }

    fn get_job(&self, id: i64) -> Result<Option<RetryJob>> {
        let state = self.state.lock().unwrap();
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    fn get_active_for_notification(&self, notification_id: i64) -> Result<Option<RetryJob>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .jobs
            .iter()
            .find(|j| j.notification_id == notification_id && j.status.is_active())
            .cloned())
    }

    fn stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in &state.jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::InFlight => stats.in_flight += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    fn reset_in_flight(&self) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut reset = 0;
        for job in state.jobs.iter_mut() {
            if job.status == JobStatus::InFlight {
                job.status = JobStatus::Pending;
                job.updated_at = now();
                reset += 1;
            }
        }
        Ok(reset)
    }

    fn purge_finished_older_than(&self, max_age_secs: i64) -> Result<usize> {
        let cutoff = now() - max_age_secs;
        let mut state = self.state.lock().unwrap();
        let before = state.jobs.len();
        state
            .jobs
            .retain(|j| j.status.is_active() || j.updated_at >= cutoff);
        Ok(before - state.jobs.len())
    }
}
