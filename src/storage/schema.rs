//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Page-Audit database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Registered URLs
CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_urls_created_at ON urls(created_at);

-- One row per crawl attempt; never deleted
CREATE TABLE IF NOT EXISTS crawl_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL REFERENCES urls(id),
    status TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_jobs_url ON crawl_jobs(url_id);
CREATE INDEX IF NOT EXISTS idx_crawl_jobs_status ON crawl_jobs(status);

-- At most one result per job
CREATE TABLE IF NOT EXISTS crawl_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL UNIQUE REFERENCES crawl_jobs(id),
    url_id INTEGER NOT NULL REFERENCES urls(id),
    html_version TEXT,
    title TEXT,
    headings_h1 INTEGER NOT NULL DEFAULT 0,
    headings_h2 INTEGER NOT NULL DEFAULT 0,
    headings_h3 INTEGER NOT NULL DEFAULT 0,
    headings_h4 INTEGER NOT NULL DEFAULT 0,
    headings_h5 INTEGER NOT NULL DEFAULT 0,
    headings_h6 INTEGER NOT NULL DEFAULT 0,
    internal_links INTEGER NOT NULL DEFAULT 0,
    external_links INTEGER NOT NULL DEFAULT 0,
    inaccessible_links INTEGER NOT NULL DEFAULT 0,
    has_login_form INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_results_url ON crawl_results(url_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_initializes() {
        let conn = Connection::open_in_memory().unwrap();
        let result = initialize_schema(&conn);
        assert!(result.is_ok());
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["urls", "crawl_jobs", "crawl_results"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_result_per_job_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO urls (url, created_at, updated_at) VALUES ('https://example.com/', 'x', 'x');
             INSERT INTO crawl_jobs (url_id, status, created_at, updated_at) VALUES (1, 'running', 'x', 'x');
             INSERT INTO crawl_results (job_id, url_id, created_at) VALUES (1, 1, 'x');",
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO crawl_results (job_id, url_id, created_at) VALUES (1, 1, 'x')",
            [],
        );
        assert!(second.is_err());
    }
}
