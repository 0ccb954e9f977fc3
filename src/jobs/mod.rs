//! Crawl job orchestration
//!
//! [`JobOrchestrator`] accepts crawl requests, queues them on a bounded
//! channel and drives each job through a fixed pool of workers. Job status
//! is only changed through conditional store transitions, so a user `stop`
//! and a worker racing on the same job never both win.

mod orchestrator;
mod worker;

pub use orchestrator::JobOrchestrator;

use crate::state::JobStatus;
use crate::storage::{CrawlJob, StorageError, UrlStore};
use crate::AuditError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Message recorded on jobs stopped without an explicit reason
pub const DEFAULT_STOP_REASON: &str = "Stopped by user";

/// Errors returned by the orchestrator
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(i64),

    /// The caller gave up waiting for a queue slot; the job stays Queued
    #[error("enqueue of job {job_id} cancelled")]
    Cancelled { job_id: i64 },

    #[error("orchestrator is shutting down")]
    ShuttingDown,

    #[error("job queue is closed")]
    QueueClosed,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Looks up the address of every URL ID to crawl
///
/// Fails on the first ID that is not registered, before any job exists.
pub async fn resolve_targets(
    urls: &dyn UrlStore,
    url_ids: &[i64],
) -> crate::Result<Vec<(i64, String)>> {
    let mut targets = Vec::with_capacity(url_ids.len());
    for &url_id in url_ids {
        let record = urls.get(url_id).await?.ok_or(AuditError::UnknownUrl(url_id))?;
        targets.push((record.id, record.url));
    }
    Ok(targets)
}

/// Snapshot of a job as reported by [`JobOrchestrator::status`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusView {
    pub id: i64,
    pub url_id: i64,
    pub status: JobStatus,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CrawlJob> for JobStatusView {
    fn from(job: CrawlJob) -> Self {
        Self {
            id: job.id,
            url_id: job.url_id,
            status: job.status,
            error: job.error_message,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// A job moved to Stopped by [`JobOrchestrator::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoppedJob {
    pub url_id: i64,
    pub job_id: i64,
}

/// Unit of work handed to the pool
#[derive(Debug, Clone)]
pub(crate) struct JobTask {
    pub job_id: i64,
    pub url_id: i64,
    pub url: String,
}
