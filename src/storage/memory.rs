//! In-memory storage implementation
//!
//! Holds every record in vectors behind one async mutex. Conditional job
//! updates compare and swap the status while the lock is held. Used by unit
//! tests and by callers that do not need persistence.

use crate::state::JobStatus;
use crate::storage::traits::{
    check_transition, JobStore, ResultStore, StorageError, StorageResult, UrlStore,
};
use crate::storage::{
    CrawlJob, CrawlResult, ListQuery, NewCrawlResult, SortOrder, TransitionEffects, UrlPage,
    UrlRecord, UrlSort,
};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryState {
    urls: Vec<UrlRecord>,
    jobs: Vec<CrawlJob>,
    results: Vec<CrawlResult>,
}

/// In-memory backend for all three stores
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare_urls(a: &UrlRecord, b: &UrlRecord, sort: UrlSort) -> Ordering {
    let primary = match sort {
        UrlSort::Id => a.id.cmp(&b.id),
        UrlSort::Url => a.url.cmp(&b.url),
        UrlSort::CreatedAt => a.created_at.cmp(&b.created_at),
        UrlSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
    };
    primary.then(a.id.cmp(&b.id))
}

#[async_trait]
impl UrlStore for MemoryStorage {
    async fn register(&self, url: &str) -> StorageResult<UrlRecord> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.urls.iter().find(|r| r.url == url) {
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let record = UrlRecord {
            id: state.urls.len() as i64 + 1,
            url: url.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.urls.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<UrlRecord>> {
        let state = self.state.lock().await;
        Ok(state.urls.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, query: ListQuery) -> StorageResult<UrlPage> {
        let query = query.normalized();
        let state = self.state.lock().await;

        let mut items = state.urls.clone();
        items.sort_by(|a, b| {
            let ordering = compare_urls(a, b, query.sort);
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = items
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .collect();

        Ok(UrlPage {
            items,
            total: state.urls.len() as u64,
            page: query.page,
            limit: query.limit,
        })
    }
}

#[async_trait]
impl JobStore for MemoryStorage {
    async fn enqueue(&self, url_id: i64) -> StorageResult<CrawlJob> {
        let mut state = self.state.lock().await;
        if !state.urls.iter().any(|r| r.id == url_id) {
            return Err(StorageError::UrlNotFound(url_id));
        }

        let now = Utc::now();
        let job = CrawlJob {
            id: state.jobs.len() as i64 + 1,
            url_id,
            status: JobStatus::Queued,
            started_at: None,
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(job.clone());
        Ok(job)
    }

    async fn transition(
        &self,
        job_id: i64,
        from: &[JobStatus],
        to: JobStatus,
        effects: TransitionEffects,
    ) -> StorageResult<bool> {
        check_transition(from, to)?;

        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(false);
        };
        if !from.contains(&job.status) {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = to;
        if to == JobStatus::Running {
            job.started_at = Some(now);
        }
        if to.is_terminal() {
            job.completed_at = Some(now);
        }
        if let Some(message) = effects.error_message {
            job.error_message = Some(message);
        }
        job.updated_at = now;
        Ok(true)
    }

    async fn get(&self, id: i64) -> StorageResult<Option<CrawlJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .filter(|j| j.url_id == url_id)
            .max_by_key(|j| j.id)
            .cloned())
    }

    async fn history_for_url(&self, url_id: i64) -> StorageResult<Vec<CrawlJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<CrawlJob> = state
            .jobs
            .iter()
            .filter(|j| j.url_id == url_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(jobs)
    }
}

#[async_trait]
impl ResultStore for MemoryStorage {
    async fn create(&self, result: NewCrawlResult) -> StorageResult<CrawlResult> {
        let mut state = self.state.lock().await;
        if state.results.iter().any(|r| r.job_id == result.job_id) {
            return Err(StorageError::ConstraintViolation(format!(
                "result for job {} rejected",
                result.job_id
            )));
        }
        if !state.jobs.iter().any(|j| j.id == result.job_id) {
            return Err(StorageError::JobNotFound(result.job_id));
        }

        let created = CrawlResult {
            id: state.results.len() as i64 + 1,
            job_id: result.job_id,
            url_id: result.url_id,
            html_version: result.html_version,
            title: result.title,
            headings: result.headings,
            internal_links: result.internal_links,
            external_links: result.external_links,
            inaccessible_links: result.inaccessible_links,
            has_login_form: result.has_login_form,
            created_at: Utc::now(),
        };
        state.results.push(created.clone());
        Ok(created)
    }

    async fn for_job(&self, job_id: i64) -> StorageResult<Option<CrawlResult>> {
        let state = self.state.lock().await;
        Ok(state.results.iter().find(|r| r.job_id == job_id).cloned())
    }

    async fn latest_for_url(&self, url_id: i64) -> StorageResult<Option<CrawlResult>> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .iter()
            .filter(|r| r.url_id == url_id)
            .max_by_key(|r| r.id)
            .cloned())
    }
}
