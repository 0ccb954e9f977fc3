//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the URL, job and
//! result stores. A single connection is shared behind an async mutex; every
//! store call runs its statements while holding it, so the conditional job
//! update is atomic with respect to other callers of the same storage.

use crate::state::JobStatus;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    check_transition, JobStore, ResultStore, StorageError, StorageResult, UrlStore,
};
use crate::storage::{
    CrawlJob, CrawlResult, ListQuery, NewCrawlResult, TransitionEffects, UrlPage, UrlRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use tokio::sync::Mutex;

const JOB_COLUMNS: &str =
    "id, url_id, status, started_at, completed_at, error_message, created_at, updated_at";

const RESULT_COLUMNS: &str = "id, job_id, url_id, html_version, title, headings_h1, headings_h2, \
     headings_h3, headings_h4, headings_h5, headings_h6, internal_links, external_links, \
     inaccessible_links, has_login_form, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ToSql for JobStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_db_string()))
    }
}

impl FromSql for JobStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        JobStatus::from_db_string(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown job status '{}'", s).into()))
    }
}

fn url_from_row(row: &Row<'_>) -> rusqlite::Result<UrlRecord> {
    Ok(UrlRecord {
        id: row.get(0)?,
        url: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlJob> {
    Ok(CrawlJob {
        id: row.get(0)?,
        url_id: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        error_message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlResult> {
    Ok(CrawlResult {
        id: row.get(0)?,
        job_id: row.get(1)?,
        url_id: row.get(2)?,
        html_version: row.get(3)?,
        title: row.get(4)?,
        headings: [
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
            row.get(9)?,
            row.get(10)?,
        ],
        internal_links: row.get(11)?,
        external_links: row.get(12)?,
        inaccessible_links: row.get(13)?,
        has_login_form: row.get(14)?,
        created_at: row.get(15)?,
    })
}

/// Maps UNIQUE / FOREIGN KEY failures to `ConstraintViolation`
fn map_constraint(err: rusqlite::Error, context: String) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(context)
        }
        _ => StorageError::Sqlite(err),
    }
}

// ===== URL Queries =====

fn register_url(conn: &Connection, url: &str) -> StorageResult<UrlRecord> {
    let existing = conn
        .query_row(
            "SELECT id, url, created_at, updated_at FROM urls WHERE url = ?1",
            params![url],
            url_from_row,
        )
        .optional()?;

    if let Some(record) = existing {
        return Ok(record);
    }

    let now = Utc::now();
    conn.execute(
        "INSERT INTO urls (url, created_at, updated_at) VALUES (?1, ?2, ?3)",
        params![url, now, now],
    )?;

    Ok(UrlRecord {
        id: conn.last_insert_rowid(),
        url: url.to_string(),
        created_at: now,
        updated_at: now,
    })
}

fn list_urls(conn: &Connection, query: ListQuery) -> StorageResult<UrlPage> {
    let query = query.normalized();

    let total: i64 = conn.query_row("SELECT COUNT(*) FROM urls", [], |row| row.get(0))?;

    // Column and direction come from closed enums, never from user text.
    let sql = format!(
        "SELECT id, url, created_at, updated_at FROM urls ORDER BY {} {}, id {} LIMIT ?1 OFFSET ?2",
        query.sort.column(),
        query.order.keyword(),
        query.order.keyword()
    );
    let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params![query.limit, offset], url_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(UrlPage {
        items,
        total: total.max(0) as u64,
        page: query.page,
        limit: query.limit,
    })
}

// ===== Job Queries =====

fn get_job(conn: &Connection, id: i64) -> StorageResult<Option<CrawlJob>> {
    let sql = format!("SELECT {} FROM crawl_jobs WHERE id = ?1", JOB_COLUMNS);
    Ok(conn.query_row(&sql, params![id], job_from_row).optional()?)
}

fn transition_job(
    conn: &Connection,
    job_id: i64,
    from: &[JobStatus],
    to: JobStatus,
    effects: &TransitionEffects,
) -> StorageResult<bool> {
    check_transition(from, to)?;
    if from.is_empty() {
        return Ok(false);
    }

    let now = Utc::now();
    let started_at: Option<DateTime<Utc>> = (to == JobStatus::Running).then_some(now);
    let completed_at: Option<DateTime<Utc>> = to.is_terminal().then_some(now);

    let placeholders = vec!["?"; from.len()].join(", ");
    let sql = format!(
        "UPDATE crawl_jobs SET status = ?, started_at = COALESCE(?, started_at), \
         completed_at = COALESCE(?, completed_at), error_message = COALESCE(?, error_message), \
         updated_at = ? WHERE id = ? AND status IN ({})",
        placeholders
    );

    let mut args: Vec<&dyn ToSql> = vec![
        &to,
        &started_at,
        &completed_at,
        &effects.error_message,
        &now,
        &job_id,
    ];
    for status in from {
        args.push(status);
    }

    let changed = conn.execute(&sql, args.as_slice())?;
    Ok(changed == 1)
}

// ===== Result Queries =====

fn insert_result(conn: &Connection, new: NewCrawlResult) -> StorageResult<CrawlResult> {
    let now = Utc::now();
    let [h1, h2, h3, h4, h5, h6] = new.headings;
    conn.execute(
        "INSERT INTO crawl_results (job_id, url_id, html_version, title, headings_h1, headings_h2,
         headings_h3, headings_h4, headings_h5, headings_h6, internal_links, external_links,
         inaccessible_links, has_login_form, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            new.job_id,
            new.url_id,
            new.html_version,
            new.title,
            h1,
            h2,
            h3,
            h4,
            h5,
            h6,
            new.internal_links,
            new.external_links,
            new.inaccessible_links,
            new.has_login_form,
            now
        ],
    )
    .map_err(|e| map_constraint(e, format!("result for job {} rejected", new.job_id)))?;

    Ok(CrawlResult {
        id: conn.last_insert_rowid(),
        job_id: new.job_id,
        url_id: new.url_id,
        html_version: new.html_version,
        title: new.title,
        headings: new.headings,
        internal_links: new.internal_links,
        external_links: new.external_links,
        inaccessible_links: new.inaccessible_links,
        has_login_form: new.has_login_form,
        created_at: now,
    })
}

#[async_trait]
impl UrlStore for SqliteStorage {
    async fn register(&self, url: &str) -> StorageResult<UrlRecord> {
        let conn = self.conn.lock().await;
        register_url(&conn, url)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<UrlRecord>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row(
                "SELECT id, url, created_at, updated_at FROM urls WHERE id = ?1",
                params![id],
                url_from_row,
            )
            .optional()?)
    }

    async fn list(&self, query: ListQuery) -> StorageResult<UrlPage> {
        let conn = self.conn.lock().await;
        list_urls(&conn, query)
    }
}

#[async_trait]
impl JobStore for SqliteStorage {
    async fn enqueue(&self, url_id: i64) -> StorageResult<CrawlJob> {
        let conn = self.conn.lock().await;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO crawl_jobs (url_id, status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![url_id, JobStatus::Queued, now, now],
        )
        .map_err(|e| match map_constraint(e, String::new()) {
            StorageError::ConstraintViolation(_) => StorageError::UrlNotFound(url_id),
            other => other,
        })?;

        Ok(CrawlJob {
            id: conn.last_insert_rowid(),
            url_id,
            status: JobStatus::Queued,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn transition(
        &self,
        job_id: i64,
        from: &[JobStatus],
        to: JobStatus,
        effects: TransitionEffects,
    ) -> StorageResult<bool> {
        let conn = self.conn.lock().await;
        transition_job(&conn, job_id, from, to, &effects)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<CrawlJob>> {
        let conn = self.conn.lock().await;
        get_job(&conn, id)
    }

    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlJob>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM crawl_jobs WHERE url_id = ?1 ORDER BY id DESC LIMIT 1",
            JOB_COLUMNS
        );
        Ok(conn.query_row(&sql, params![url_id], job_from_row).optional()?)
    }

    async fn history_for_url(&self, url_id: i64) -> StorageResult<Vec<CrawlJob>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM crawl_jobs WHERE url_id = ?1 ORDER BY id DESC",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![url_id], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }
}

#[async_trait]
impl ResultStore for SqliteStorage {
    async fn create(&self, result: NewCrawlResult) -> StorageResult<CrawlResult> {
        let conn = self.conn.lock().await;
        insert_result(&conn, result)
    }

    async fn for_job(&self, job_id: i64) -> StorageResult<Option<CrawlResult>> {
        let conn = self.conn.lock().await;
        let sql = format!("SELECT {} FROM crawl_results WHERE job_id = ?1", RESULT_COLUMNS);
        Ok(conn.query_row(&sql, params![job_id], result_from_row).optional()?)
    }

    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlResult>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM crawl_results WHERE url_id = ?1 ORDER BY id DESC LIMIT 1",
            RESULT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![url_id], result_from_row)
            .optional()?)
    }
}
