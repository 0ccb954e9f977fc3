//! Storage traits and error types
//!
//! This module defines the store interfaces the job orchestrator and the CLI
//! work against, and the error type shared by every backend.

use crate::state::JobStatus;
use crate::storage::{
    CrawlJob, CrawlResult, ListQuery, NewCrawlResult, TransitionEffects, UrlPage, UrlRecord,
};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("URL not found: {0}")]
    UrlNotFound(i64),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Checks every `from` status against the transition table
pub(crate) fn check_transition(from: &[JobStatus], to: JobStatus) -> StorageResult<()> {
    match from.iter().find(|status| !status.can_transition_to(to)) {
        Some(&bad) => Err(StorageError::InvalidTransition { from: bad, to }),
        None => Ok(()),
    }
}

/// Registered URL records
#[async_trait]
pub trait UrlStore: Send + Sync {
    /// Inserts a normalized URL or returns the existing record for it
    ///
    /// # Arguments
    ///
    /// * `url` - The normalized URL
    ///
    /// # Returns
    ///
    /// The URL record (either newly created or existing)
    async fn register(&self, url: &str) -> StorageResult<UrlRecord>;

    /// Gets a URL by ID
    async fn get(&self, id: i64) -> StorageResult<Option<UrlRecord>>;

    /// Lists URLs one page at a time
    ///
    /// The query is normalized first, so the returned page and limit may
    /// differ from the requested ones.
    async fn list(&self, query: ListQuery) -> StorageResult<UrlPage>;
}

/// Crawl job records
///
/// Status is only ever changed through [`JobStore::transition`], which makes
/// concurrent writers (workers, `stop`) race safely: exactly one of several
/// competing transitions out of the same status is applied.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a job in the Queued status for a registered URL
    async fn enqueue(&self, url_id: i64) -> StorageResult<CrawlJob>;

    /// Conditionally moves a job to `to`
    ///
    /// The update is applied only if the job's current status is one of
    /// `from`. Moving to Running sets `started_at`; moving to a terminal
    /// status sets `completed_at`.
    ///
    /// # Arguments
    ///
    /// * `job_id` - The job to update
    /// * `from` - Statuses the job must currently be in
    /// * `to` - The new status
    /// * `effects` - Fields written together with the status
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The transition was applied
    /// * `Ok(false)` - The job was not in any of `from` (or does not exist)
    /// * `Err(StorageError::InvalidTransition)` - Some `from -> to` pair is
    ///   illegal
    async fn transition(
        &self,
        job_id: i64,
        from: &[JobStatus],
        to: JobStatus,
        effects: TransitionEffects,
    ) -> StorageResult<bool>;

    /// Gets a job by ID
    async fn get(&self, id: i64) -> StorageResult<Option<CrawlJob>>;

    /// Gets the job with the greatest ID for a URL
    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlJob>>;

    /// Gets every job for a URL, newest first
    async fn history_for_url(&self, url_id: i64) -> StorageResult<Vec<CrawlJob>>;
}

/// Crawl result records
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persists a result
    ///
    /// Fails with `ConstraintViolation` if the job already has one.
    async fn create(&self, result: NewCrawlResult) -> StorageResult<CrawlResult>;

    /// Gets the result of a job
    async fn for_job(&self, job_id: i64) -> StorageResult<Option<CrawlResult>>;

    /// Gets the most recent result for a URL
    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlResult>>;
}
